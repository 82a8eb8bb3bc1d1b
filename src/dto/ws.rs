//! Messages exchanged with game clients over the WebSocket.
//!
//! Action names mirror the wire protocol the frontend speaks
//! (`create-room`, `join-room`, `start-game`, ...).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::{
        game::{RoundEnd, RoundStart},
        validation::{validate_avatar, validate_display_name},
    },
    error::ServiceError,
    state::room::User,
};

/// Messages accepted from game clients.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// First message of every connection: who is talking.
    Identification {
        /// Display name for the roster.
        name: String,
        /// Avatar URL, possibly empty.
        #[serde(default)]
        avatar: String,
    },
    /// Open a new room with the sender as host.
    CreateRoom,
    /// Join an existing room.
    JoinRoom {
        /// Identifier broadcast in `room-created`.
        room_id: Uuid,
    },
    /// Leave the current room and unregister.
    LeaveRoom,
    /// Select the playlist the next game draws from (host-only).
    SetPlaylist {
        /// Provider-side playlist reference.
        playlist: String,
    },
    /// Start a match over the selected playlist (host-only).
    StartGame {
        /// Round budget; must meet the configured minimum.
        total_rounds: u32,
    },
    /// Report that the ongoing round has finished.
    RoundEnded {
        /// The round the client believes just ended.
        round_number: u32,
    },
    /// Forward-compatibility catch-all.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a text frame and validate variant fields.
    pub fn from_json_str(text: &str) -> Result<Self, ServiceError> {
        let message: Self = serde_json::from_str(text)
            .map_err(|err| ServiceError::InvalidInput(format!("malformed message: {err}")))?;

        if let ClientMessage::Identification { name, avatar } = &message {
            validate_display_name(name)
                .and_then(|()| validate_avatar(avatar))
                .map_err(|err| {
                    ServiceError::InvalidInput(
                        err.message
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| err.code.to_string()),
                    )
                })?;
        }

        Ok(message)
    }
}

/// Messages pushed to game clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Sent only to the creator after `create-room`.
    RoomCreated {
        /// Identifier other players use to join.
        room_id: Uuid,
    },
    /// Broadcast when a member joins.
    AddPeer {
        /// The member that joined.
        user: User,
    },
    /// Broadcast when a member leaves or disconnects.
    RemovePeer {
        /// The member that left.
        user: User,
    },
    /// Broadcast when the host selects a playlist.
    PlaylistSet {
        /// Provider-side playlist reference.
        playlist: String,
    },
    /// Broadcast when a round opens.
    StartRound(RoundStart),
    /// Broadcast when a round closes. When the pool is exhausted this is the
    /// last message of the match.
    RoundEnded {
        /// Reveal of the closed round.
        #[serde(flatten)]
        end: RoundEnd,
        /// Whether another round follows.
        game_over: bool,
    },
    /// Sent only to the connection whose request failed.
    Error {
        /// Taxonomy kind (`validation`, `authorization`, `state`, `provider`).
        kind: &'static str,
        /// Human readable description.
        message: String,
    },
}

impl ServerMessage {
    /// Build an error message from a service failure.
    pub fn from_error(err: &ServiceError) -> Self {
        ServerMessage::Error {
            kind: err.kind().as_str(),
            message: err.to_string(),
        }
    }
}

//! Error taxonomy shared by the session registry, rooms, and games.

use thiserror::Error;
use uuid::Uuid;

use crate::provider::ProviderError;

/// Broad classification used when reporting a failure back to the initiating
/// connection. No variant is fatal to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or a missing/duplicate entity; state left unchanged.
    Validation,
    /// A non-host invoked a host-only operation.
    Authorization,
    /// The operation is not legal in the current room/game state.
    State,
    /// The external track provider failed.
    Provider,
}

impl ErrorKind {
    /// Stable wire label for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::State => "state",
            ErrorKind::Provider => "provider",
        }
    }
}

/// Errors surfaced by registry, room, and game operations.
///
/// Every operation validates fully before mutating, so a returned error means
/// the room and game are exactly as they were before the call.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The connection identifier is already registered.
    #[error("connection `{0}` is already registered")]
    DuplicateConnection(Uuid),
    /// The connection has not identified itself yet.
    #[error("connection `{0}` is not registered")]
    NotRegistered(Uuid),
    /// The connection is not currently a member of any room.
    #[error("connection `{0}` is not in a room")]
    NotInRoom(Uuid),
    /// The connection already belongs to a room.
    #[error("connection `{0}` is already in a room")]
    AlreadyInRoom(Uuid),
    /// No room exists under the given identifier.
    #[error("room `{0}` not found")]
    RoomNotFound(Uuid),
    /// A user with the same id is already on the roster.
    #[error("user `{0}` is already a member of the room")]
    DuplicateUser(Uuid),
    /// The user is not on the roster.
    #[error("user `{0}` is not a member of the room")]
    UserNotFound(Uuid),
    /// A host-only operation was invoked by another member.
    #[error("only the host may {0}")]
    NotHost(&'static str),
    /// Malformed or out-of-range client input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The room already has a running game.
    #[error("game already started")]
    GameAlreadyStarted,
    /// Another start-game call is waiting on its track fetch.
    #[error("game start already in progress")]
    StartInProgress,
    /// The start this commit belonged to was rolled back before it resolved.
    #[error("game start was rolled back or never began")]
    StartSuperseded,
    /// The operation needs a running game and there is none.
    #[error("no game is currently running")]
    NoOngoingGame,
    /// The playlist resolved to fewer tracks than the round budget needs.
    #[error("playlist holds {available} tracks but {required} are required")]
    InsufficientTracks {
        /// Number of tracks the fetched pool actually contains.
        available: usize,
        /// `options_per_round * total_rounds` lower bound.
        required: usize,
    },
    /// Fewer unplayed tracks remain than one round needs. Callers treat this
    /// as the natural end of the match.
    #[error("fewer than {0} unplayed tracks remain")]
    NoAnswerAvailable(usize),
    /// A round-ended signal arrived out of order or twice.
    #[error("round {got} is out of sequence (expected {expected})")]
    RoundSequence {
        /// The only round number the game would accept next.
        expected: u32,
        /// The round number the client reported.
        got: u32,
    },
    /// The reported round number does not match the ongoing round.
    #[error("round {got} does not match the ongoing round {expected}")]
    RoundMismatch {
        /// Round number of the ongoing round.
        expected: u32,
        /// The round number the client reported.
        got: u32,
    },
    /// The ongoing round is not in a state that accepts this transition.
    #[error("round {0} is not ongoing")]
    RoundNotOngoing(u32),
    /// The room was destroyed while its game start was fetching tracks.
    #[error("room was closed while the game was starting")]
    RoomGone,
    /// The external track provider failed during a game start.
    #[error("track fetch failed")]
    TrackFetchFailed(#[from] ProviderError),
}

impl ServiceError {
    /// Classify this error for gateway reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::DuplicateConnection(_)
            | ServiceError::NotRegistered(_)
            | ServiceError::RoomNotFound(_)
            | ServiceError::DuplicateUser(_)
            | ServiceError::UserNotFound(_)
            | ServiceError::InvalidInput(_)
            | ServiceError::InsufficientTracks { .. } => ErrorKind::Validation,
            ServiceError::NotHost(_) => ErrorKind::Authorization,
            ServiceError::NotInRoom(_)
            | ServiceError::AlreadyInRoom(_)
            | ServiceError::GameAlreadyStarted
            | ServiceError::StartInProgress
            | ServiceError::StartSuperseded
            | ServiceError::NoOngoingGame
            | ServiceError::NoAnswerAvailable(_)
            | ServiceError::RoundSequence { .. }
            | ServiceError::RoundMismatch { .. }
            | ServiceError::RoundNotOngoing(_)
            | ServiceError::RoomGone => ErrorKind::State,
            ServiceError::TrackFetchFailed(_) => ErrorKind::Provider,
        }
    }
}

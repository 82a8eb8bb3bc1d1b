//! Room state: roster, host, playlist selection, and game lifecycle.

use indexmap::IndexMap;
use rand::Rng;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::QuizRules,
    dto::game::{RoundEnd, RoundStart},
    error::ServiceError,
    state::game::{Game, Track},
};

/// Identity of a participant within one room.
///
/// `score` and `rank` are carried on the wire but never populated; scoring is
/// computed client-side for now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct User {
    /// Stable connection identity; doubles as the roster key.
    pub id: Uuid,
    /// Display name chosen at identification.
    pub name: String,
    /// Avatar URL chosen at identification.
    pub avatar: String,
    /// Unpopulated placeholder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    /// Unpopulated placeholder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    /// Back-reference to the owning room, absent while unassigned.
    pub room_id: Option<Uuid>,
}

impl User {
    /// Build an unassigned user for a fresh connection.
    pub fn new(id: Uuid, name: String, avatar: String) -> Self {
        Self {
            id,
            name,
            avatar,
            score: None,
            rank: None,
            room_id: None,
        }
    }
}

/// Lifecycle tag of a room. The game exists exactly while in [`RoomPhase::InGame`].
#[derive(Debug)]
pub enum RoomPhase {
    /// No game running. `starting` marks an in-flight start-game whose track
    /// fetch has not resolved yet.
    Lobby {
        /// Set between `begin_start` and `commit_start`/`abort_start`.
        starting: bool,
    },
    /// A game is running.
    InGame(Game),
}

/// A joinable lobby tied to one host, owning at most one active game.
#[derive(Debug)]
pub struct Room {
    room_id: Uuid,
    host: Uuid,
    players: IndexMap<Uuid, User>,
    current_playlist: Option<String>,
    phase: RoomPhase,
    previous_games: IndexMap<Uuid, Game>,
    closed: bool,
}

impl Room {
    /// Create a room with `host` as its sole member.
    pub fn new(mut host: User) -> Self {
        let room_id = Uuid::new_v4();
        host.room_id = Some(room_id);
        let host_id = host.id;
        let mut players = IndexMap::new();
        players.insert(host_id, host);

        Self {
            room_id,
            host: host_id,
            players,
            current_playlist: None,
            phase: RoomPhase::Lobby { starting: false },
            previous_games: IndexMap::new(),
            closed: false,
        }
    }

    /// Unique identifier of this room.
    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    /// Connection id of the host.
    ///
    /// The host is never reassigned: once the host leaves, this keeps naming
    /// the departed identity and host-gated actions end for the room.
    pub fn host_id(&self) -> Uuid {
        self.host
    }

    /// Whether `id` is the host.
    pub fn is_host(&self, id: Uuid) -> bool {
        self.host == id
    }

    /// Current roster size.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Roster in join order.
    pub fn players(&self) -> impl Iterator<Item = &User> {
        self.players.values()
    }

    /// Connection ids of every member, used for broadcast fan-out.
    pub fn member_ids(&self) -> Vec<Uuid> {
        self.players.keys().copied().collect()
    }

    /// Playlist reference selected for the next game, if any.
    pub fn current_playlist(&self) -> Option<&str> {
        self.current_playlist.as_deref()
    }

    /// Whether a game is currently running.
    pub fn game_started(&self) -> bool {
        matches!(self.phase, RoomPhase::InGame(_))
    }

    /// The running game, if any.
    pub fn ongoing_game(&self) -> Option<&Game> {
        match &self.phase {
            RoomPhase::InGame(game) => Some(game),
            RoomPhase::Lobby { .. } => None,
        }
    }

    /// Archive of finished games, append-only.
    pub fn previous_games(&self) -> &IndexMap<Uuid, Game> {
        &self.previous_games
    }

    /// Whether the registry has torn this room down.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Mark the room as torn down. Set under the room lock as the last
    /// member leaves, so a joiner holding a stale handle cannot enter
    /// between the roster emptying and the index entry going away.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Add a member to the roster.
    pub fn add_user(&mut self, mut user: User) -> Result<&User, ServiceError> {
        if self.players.contains_key(&user.id) {
            return Err(ServiceError::DuplicateUser(user.id));
        }
        user.room_id = Some(self.room_id);
        let id = user.id;
        self.players.insert(id, user);
        Ok(&self.players[&id])
    }

    /// Remove a member from the roster, returning the departed user.
    pub fn remove_user(&mut self, id: Uuid) -> Result<User, ServiceError> {
        let mut user = self
            .players
            .shift_remove(&id)
            .ok_or(ServiceError::UserNotFound(id))?;
        user.room_id = None;
        Ok(user)
    }

    /// Select the playlist the next game will draw from. Lobby-only.
    pub fn set_playlist(&mut self, playlist: String) -> Result<(), ServiceError> {
        if self.game_started() {
            return Err(ServiceError::GameAlreadyStarted);
        }
        self.current_playlist = Some(playlist);
        Ok(())
    }

    /// Phase 1 of start-game: validate synchronously and set the `starting`
    /// marker, returning the playlist to fetch.
    ///
    /// The marker rejects a second concurrent start while the fetch is in
    /// flight; [`Room::commit_start`] or [`Room::abort_start`] clears it.
    pub fn begin_start(
        &mut self,
        caller: Uuid,
        total_rounds: u32,
        rules: &QuizRules,
    ) -> Result<String, ServiceError> {
        if !self.is_host(caller) {
            return Err(ServiceError::NotHost("start the game"));
        }
        match self.phase {
            RoomPhase::InGame(_) => return Err(ServiceError::GameAlreadyStarted),
            RoomPhase::Lobby { starting: true } => return Err(ServiceError::StartInProgress),
            RoomPhase::Lobby { starting: false } => {}
        }
        if total_rounds < rules.min_rounds {
            return Err(ServiceError::InvalidInput(format!(
                "a game needs at least {} rounds",
                rules.min_rounds
            )));
        }
        if self.players.len() < rules.min_players {
            return Err(ServiceError::InvalidInput(format!(
                "a game needs at least {} players",
                rules.min_players
            )));
        }
        let Some(playlist) = self.current_playlist.clone() else {
            return Err(ServiceError::InvalidInput(
                "no playlist has been selected".into(),
            ));
        };

        self.phase = RoomPhase::Lobby { starting: true };
        Ok(playlist)
    }

    /// Roll back an in-flight start, leaving the room exactly as it was
    /// before `begin_start`. No-op unless a start is pending.
    pub fn abort_start(&mut self) {
        if let RoomPhase::Lobby { starting } = &mut self.phase {
            *starting = false;
        }
    }

    /// Phase 2 of start-game: re-validate after the fetch resolved, construct
    /// the game, and return the first round's start payload.
    ///
    /// Consumes the `starting` marker whether or not it succeeds, so a failed
    /// commit leaves the room exactly as it was before `begin_start`.
    pub fn commit_start(
        &mut self,
        tracks: Vec<Track>,
        total_rounds: u32,
        rules: &QuizRules,
        rng: &mut impl Rng,
    ) -> Result<RoundStart, ServiceError> {
        match self.phase {
            RoomPhase::InGame(_) => return Err(ServiceError::GameAlreadyStarted),
            // The marker was cleared while the fetch was pending; another
            // path decided this start no longer applies.
            RoomPhase::Lobby { starting: false } => return Err(ServiceError::StartSuperseded),
            RoomPhase::Lobby { starting: true } => {
                self.phase = RoomPhase::Lobby { starting: false };
            }
        }
        if self.players.len() < rules.min_players {
            return Err(ServiceError::InvalidInput(format!(
                "a game needs at least {} players",
                rules.min_players
            )));
        }
        let required = rules.required_pool_size(total_rounds);
        if tracks.len() < required {
            return Err(ServiceError::InsufficientTracks {
                available: tracks.len(),
                required,
            });
        }

        let mut game = Game::new(tracks, total_rounds, rules.options_per_round, rng)?;
        let start = game.data_for_round_start()?;
        self.phase = RoomPhase::InGame(game);
        Ok(start)
    }

    /// Close the ongoing round and advance the match.
    ///
    /// Returns the reveal payload and, while the pool holds out, the next
    /// round's start payload. Exhaustion archives the game and returns the
    /// room to the lobby.
    pub fn end_round(
        &mut self,
        round_number: u32,
        rng: &mut impl Rng,
    ) -> Result<(RoundEnd, Option<RoundStart>), ServiceError> {
        let RoomPhase::InGame(game) = &mut self.phase else {
            return Err(ServiceError::NoOngoingGame);
        };

        let end = game.data_for_round_end(round_number)?;
        match game.next_round(round_number + 1, rng) {
            Ok(start) => Ok((end, Some(start))),
            Err(ServiceError::NoAnswerAvailable(_)) => {
                let finished = std::mem::replace(&mut self.phase, RoomPhase::Lobby { starting: false });
                if let RoomPhase::InGame(game) = finished {
                    self.previous_games.insert(game.game_id(), game);
                }
                Ok((end, None))
            }
            Err(other) => Err(other),
        }
    }
}

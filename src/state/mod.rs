//! Process-wide session registry binding connections to users and rooms.

pub mod game;
pub mod room;

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::{AppConfig, QuizRules},
    error::ServiceError,
    provider::TrackProvider,
    state::room::{Room, User},
};

/// Shared handle to the registry, cloned into every handler.
pub type SharedRegistry = Arc<SessionRegistry>;

/// A room behind its own lock; all operations on one room serialize here.
pub type SharedRoom = Arc<Mutex<Room>>;

/// A registered connection: the identity it presented plus the channel used
/// to push messages to it.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    /// Identity snapshot; `room_id` is kept in sync by the registry.
    pub user: User,
    /// Writer-task channel for outbound frames.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Everything a departure needs to be announced to the remaining members.
#[derive(Debug)]
pub struct Departure {
    /// Room the user left.
    pub room_id: Uuid,
    /// The departed user.
    pub user: User,
    /// Members still in the room (empty when the room was destroyed).
    pub remaining: Vec<Uuid>,
}

/// The only mutable global state in the system: `connection → user` and
/// `room id → room` directories.
///
/// Registry operations are individually atomic; anything touching a room's
/// internals goes through that room's mutex, so events within one room never
/// interleave.
pub struct SessionRegistry {
    config: AppConfig,
    provider: Arc<dyn TrackProvider>,
    connections: DashMap<Uuid, ClientConnection>,
    rooms: DashMap<Uuid, SharedRoom>,
}

impl SessionRegistry {
    /// Construct a registry wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig, provider: Arc<dyn TrackProvider>) -> SharedRegistry {
        Arc::new(Self {
            config,
            provider,
            connections: DashMap::new(),
            rooms: DashMap::new(),
        })
    }

    /// Quiz rules enforced by rooms and games.
    pub fn rules(&self) -> &QuizRules {
        self.config.rules()
    }

    /// Handle to the external track provider.
    pub fn provider(&self) -> Arc<dyn TrackProvider> {
        self.provider.clone()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Record a fresh connection under `id`.
    pub fn register_connection(
        &self,
        id: Uuid,
        name: String,
        avatar: String,
        tx: mpsc::UnboundedSender<Message>,
    ) -> Result<User, ServiceError> {
        match self.connections.entry(id) {
            Entry::Occupied(_) => Err(ServiceError::DuplicateConnection(id)),
            Entry::Vacant(slot) => {
                let user = User::new(id, name, avatar);
                slot.insert(ClientConnection {
                    user: user.clone(),
                    tx,
                });
                Ok(user)
            }
        }
    }

    /// Identity snapshot of a registered connection.
    pub fn connection_user(&self, id: Uuid) -> Result<User, ServiceError> {
        self.connections
            .get(&id)
            .map(|entry| entry.user.clone())
            .ok_or(ServiceError::NotRegistered(id))
    }

    /// Outbound channel of a registered connection, if still present.
    pub fn sender(&self, id: Uuid) -> Option<mpsc::UnboundedSender<Message>> {
        self.connections.get(&id).map(|entry| entry.tx.clone())
    }

    /// Allocate a room with the connection's user as host and sole member.
    pub fn create_room(&self, connection_id: Uuid) -> Result<Uuid, ServiceError> {
        let user = self.connection_user(connection_id)?;
        if user.room_id.is_some() {
            return Err(ServiceError::AlreadyInRoom(connection_id));
        }

        // Build the room fully before indexing it, so a concurrent lookup
        // never observes a half-applied create.
        let room = Room::new(user);
        let room_id = room.room_id();
        self.rooms.insert(room_id, Arc::new(Mutex::new(room)));
        self.set_connection_room(connection_id, Some(room_id));

        debug!(%room_id, host = %connection_id, "room created");
        Ok(room_id)
    }

    /// Resolve a room id into its shared handle.
    pub fn lookup_room(&self, room_id: Uuid) -> Result<SharedRoom, ServiceError> {
        self.rooms
            .get(&room_id)
            .map(|entry| entry.value().clone())
            .ok_or(ServiceError::RoomNotFound(room_id))
    }

    /// Resolve the room a connection currently belongs to.
    pub fn room_of(&self, connection_id: Uuid) -> Result<(Uuid, SharedRoom), ServiceError> {
        let user = self.connection_user(connection_id)?;
        let room_id = user.room_id.ok_or(ServiceError::NotInRoom(connection_id))?;
        Ok((room_id, self.lookup_room(room_id)?))
    }

    /// Add a registered connection to an existing room.
    ///
    /// Returns the joined user and the full member list for broadcast.
    pub async fn join_room(
        &self,
        connection_id: Uuid,
        room_id: Uuid,
    ) -> Result<(User, Vec<Uuid>), ServiceError> {
        let user = self.connection_user(connection_id)?;
        if user.room_id.is_some() {
            return Err(ServiceError::AlreadyInRoom(connection_id));
        }
        let room = self.lookup_room(room_id)?;

        let (joined, members) = {
            let mut guard = room.lock().await;
            // The handle may have been resolved just before the last member
            // left; the room marks itself closed under its lock.
            if guard.is_closed() {
                return Err(ServiceError::RoomNotFound(room_id));
            }
            let joined = guard.add_user(user)?.clone();
            (joined, guard.member_ids())
        };
        self.set_connection_room(connection_id, Some(room_id));

        debug!(%room_id, user = %connection_id, "user joined room");
        Ok((joined, members))
    }

    /// Remove a connection and, if it was in a room, its roster entry.
    ///
    /// Destroys the room once its last member is gone. Idempotent: dropping
    /// twice, or dropping an unregistered connection, is a no-op because
    /// disconnect notifications may race with an explicit leave.
    pub async fn drop_connection(&self, connection_id: Uuid) -> Option<Departure> {
        let (_, connection) = self.connections.remove(&connection_id)?;
        let room_id = connection.user.room_id?;
        let room = self.rooms.get(&room_id).map(|entry| entry.value().clone())?;

        let (user, remaining) = {
            let mut guard = room.lock().await;
            // A concurrent path may have pruned the roster already.
            let user = guard.remove_user(connection_id).ok()?;
            let remaining = guard.member_ids();
            if remaining.is_empty() {
                // Closing under the lock keeps a joiner with a stale handle
                // out of the window between here and the index removal.
                guard.close();
            }
            (user, remaining)
        };

        if remaining.is_empty() {
            self.rooms.remove(&room_id);
            debug!(%room_id, "room destroyed after last member left");
        }

        Some(Departure {
            room_id,
            user,
            remaining,
        })
    }

    fn set_connection_room(&self, connection_id: Uuid, room_id: Option<Uuid>) {
        if let Some(mut entry) = self.connections.get_mut(&connection_id) {
            entry.user.room_id = room_id;
        }
    }
}

//! Core event handlers over the session registry.
//!
//! Each function resolves the caller's room, performs the operation under the
//! room's lock, and returns the payload plus the member list the gateway
//! should broadcast to. Failures leave the room untouched.

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::game::{RoundEnd, RoundStart},
    error::ServiceError,
    state::{Departure, SharedRegistry, room::User},
};

/// Open a new room with the caller as host and sole member.
pub fn create_room(registry: &SharedRegistry, connection_id: Uuid) -> Result<Uuid, ServiceError> {
    registry.create_room(connection_id)
}

/// Join an existing room; returns the joined user and the broadcast roster.
pub async fn join_room(
    registry: &SharedRegistry,
    connection_id: Uuid,
    room_id: Uuid,
) -> Result<(User, Vec<Uuid>), ServiceError> {
    registry.join_room(connection_id, room_id).await
}

/// Select the playlist the next game draws from. Host-only.
pub async fn set_playlist(
    registry: &SharedRegistry,
    connection_id: Uuid,
    playlist: String,
) -> Result<(String, Vec<Uuid>), ServiceError> {
    let (_, room) = registry.room_of(connection_id)?;
    let mut guard = room.lock().await;
    if !guard.is_host(connection_id) {
        return Err(ServiceError::NotHost("select the playlist"));
    }
    guard.set_playlist(playlist.clone())?;
    Ok((playlist, guard.member_ids()))
}

/// Start a match: validate, fetch the track pool, and commit.
///
/// The fetch is the one suspension point in the system. The room's `starting`
/// marker is set before suspending so a second concurrent start is rejected,
/// and the room is looked up again after the fetch so a room destroyed
/// mid-flight is never resurrected; its fetched pool is simply discarded.
pub async fn start_game(
    registry: &SharedRegistry,
    connection_id: Uuid,
    total_rounds: u32,
) -> Result<(RoundStart, Vec<Uuid>), ServiceError> {
    let (room_id, room) = registry.room_of(connection_id)?;
    let playlist = room
        .lock()
        .await
        .begin_start(connection_id, total_rounds, registry.rules())?;

    debug!(%room_id, %playlist, total_rounds, "fetching track pool");
    let fetched = registry.provider().tracks_from_playlist(&playlist).await;

    // The roster may have emptied while the fetch was pending, in which case
    // the registry already dropped the room.
    let Ok(room) = registry.lookup_room(room_id) else {
        debug!(%room_id, "room disappeared during track fetch; discarding pool");
        return Err(ServiceError::RoomGone);
    };

    let mut guard = room.lock().await;
    let tracks = match fetched {
        Ok(tracks) => tracks,
        Err(err) => {
            guard.abort_start();
            return Err(err.into());
        }
    };

    let start = guard.commit_start(tracks, total_rounds, registry.rules(), &mut rand::rng())?;
    info!(%room_id, total_rounds, "game started");
    Ok((start, guard.member_ids()))
}

/// Close the ongoing round; returns the reveal, the next round's start
/// payload while the match continues, and the broadcast roster.
pub async fn round_ended(
    registry: &SharedRegistry,
    connection_id: Uuid,
    round_number: u32,
) -> Result<(RoundEnd, Option<RoundStart>, Vec<Uuid>), ServiceError> {
    let (room_id, room) = registry.room_of(connection_id)?;
    let mut guard = room.lock().await;
    let (end, next) = guard.end_round(round_number, &mut rand::rng())?;
    if next.is_none() {
        info!(%room_id, rounds = round_number, "match finished, pool exhausted");
    }
    Ok((end, next, guard.member_ids()))
}

/// Remove the caller from its room and unregister the connection.
pub async fn leave(registry: &SharedRegistry, connection_id: Uuid) -> Option<Departure> {
    registry.drop_connection(connection_id).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::ws::Message;
    use futures::future::BoxFuture;
    use tokio::sync::{Notify, mpsc};

    use crate::{
        config::AppConfig,
        provider::{ProviderError, ProviderResult, TrackProvider},
        state::{SessionRegistry, game::Track},
    };

    use super::*;

    struct FakeProvider {
        tracks: Vec<Track>,
        gate: Option<Arc<Notify>>,
        fail: bool,
    }

    impl FakeProvider {
        fn with_tracks(count: usize) -> Self {
            Self {
                tracks: pool(count),
                gate: None,
                fail: false,
            }
        }

        fn gated(count: usize, gate: Arc<Notify>) -> Self {
            Self {
                tracks: pool(count),
                gate: Some(gate),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                tracks: Vec::new(),
                gate: None,
                fail: true,
            }
        }
    }

    impl TrackProvider for FakeProvider {
        fn tracks_from_playlist(&self, _: &str) -> BoxFuture<'static, ProviderResult<Vec<Track>>> {
            let tracks = self.tracks.clone();
            let gate = self.gate.clone();
            let fail = self.fail;
            Box::pin(async move {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                if fail {
                    Err(ProviderError::PlaylistNotFound("playlist-1".into()))
                } else {
                    Ok(tracks)
                }
            })
        }
    }

    fn pool(size: usize) -> Vec<Track> {
        (0..size)
            .map(|index| Track {
                id: format!("track-{index}"),
                audio: format!("https://cdn.example/{index}.mp3"),
                title: format!("Title {index}"),
                artists: vec![format!("Artist {index}")],
            })
            .collect()
    }

    fn registry_with(provider: impl TrackProvider + 'static) -> SharedRegistry {
        SessionRegistry::new(AppConfig::default(), Arc::new(provider))
    }

    fn connect(registry: &SharedRegistry, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel::<Message>();
        registry
            .register_connection(id, name.into(), String::new(), tx)
            .unwrap();
        id
    }

    /// Room with host + guest and a selected playlist.
    async fn ready_room(registry: &SharedRegistry) -> (Uuid, Uuid, Uuid) {
        let host = connect(registry, "host");
        let guest = connect(registry, "guest");
        let room_id = create_room(registry, host).unwrap();
        join_room(registry, guest, room_id).await.unwrap();
        set_playlist(registry, host, "playlist-1".into())
            .await
            .unwrap();
        (room_id, host, guest)
    }

    #[tokio::test]
    async fn full_match_over_a_24_track_playlist() {
        let registry = registry_with(FakeProvider::with_tracks(24));
        let (_, host, _) = ready_room(&registry).await;

        let (start, members) = start_game(&registry, host, 5).await.unwrap();
        assert_eq!(start.round_number, 1);
        assert_eq!(start.options.len(), 4);
        assert_eq!(members.len(), 2);

        let (end, next, _) = round_ended(&registry, host, 1).await.unwrap();
        assert_eq!(end.round_number, 1);
        assert!(start.options.contains(&end.answer_track.title));
        assert_eq!(next.unwrap().round_number, 2);

        // A duplicated end-of-round signal is rejected.
        let err = round_ended(&registry, host, 1).await.unwrap_err();
        assert!(matches!(err, ServiceError::RoundMismatch { .. }));
    }

    #[tokio::test]
    async fn playlist_selection_is_host_gated() {
        let registry = registry_with(FakeProvider::with_tracks(24));
        let (_, _, guest) = ready_room(&registry).await;
        let err = set_playlist(&registry, guest, "playlist-2".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotHost(_)));
    }

    #[tokio::test]
    async fn start_game_requires_enough_tracks() {
        let registry = registry_with(FakeProvider::with_tracks(12));
        let (_, host, _) = ready_room(&registry).await;
        let err = start_game(&registry, host, 5).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InsufficientTracks {
                available: 12,
                required: 20
            }
        ));

        // The failure rolled everything back: a later start can succeed.
        let (_, room) = registry.room_of(host).unwrap();
        assert!(!room.lock().await.game_started());
    }

    #[tokio::test]
    async fn provider_failure_leaves_the_room_as_it_was() {
        let registry = registry_with(FakeProvider::failing());
        let (_, host, _) = ready_room(&registry).await;

        let err = start_game(&registry, host, 5).await.unwrap_err();
        assert!(matches!(err, ServiceError::TrackFetchFailed(_)));

        // The starting marker was rolled back, so a retry reaches the
        // provider again instead of dying on `StartInProgress`.
        let err = start_game(&registry, host, 5).await.unwrap_err();
        assert!(matches!(err, ServiceError::TrackFetchFailed(_)));
    }

    #[tokio::test]
    async fn concurrent_starts_build_exactly_one_game() {
        let gate = Arc::new(Notify::new());
        let registry = registry_with(FakeProvider::gated(24, gate.clone()));
        let (_, host, _) = ready_room(&registry).await;

        let racing = tokio::spawn({
            let registry = registry.clone();
            async move { start_game(&registry, host, 5).await }
        });
        // Let the first call set the starting marker and block on its fetch.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = start_game(&registry, host, 5).await.unwrap_err();
        assert!(matches!(err, ServiceError::StartInProgress));

        gate.notify_one();
        let (start, _) = racing.await.unwrap().unwrap();
        assert_eq!(start.round_number, 1);

        let (_, room) = registry.room_of(host).unwrap();
        let guard = room.lock().await;
        assert!(guard.game_started());
        assert!(guard.previous_games().is_empty());
    }

    #[tokio::test]
    async fn start_fails_when_the_roster_shrinks_mid_fetch() {
        let gate = Arc::new(Notify::new());
        let registry = registry_with(FakeProvider::gated(24, gate.clone()));
        let (_, host, guest) = ready_room(&registry).await;

        let racing = tokio::spawn({
            let registry = registry.clone();
            async move { start_game(&registry, host, 5).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // One member walks out while the fetch is pending; membership drops
        // below the minimum but the room survives.
        leave(&registry, guest).await.unwrap();

        gate.notify_one();
        let err = racing.await.unwrap().unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        // The marker was consumed: a retry fails on membership again, not on
        // a stuck in-flight start.
        let (_, room) = registry.room_of(host).unwrap();
        assert!(!room.lock().await.game_started());
        let err = start_game(&registry, host, 5).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn start_is_discarded_when_everyone_leaves_mid_fetch() {
        let gate = Arc::new(Notify::new());
        let registry = registry_with(FakeProvider::gated(24, gate.clone()));
        let (room_id, host, guest) = ready_room(&registry).await;

        let racing = tokio::spawn({
            let registry = registry.clone();
            async move { start_game(&registry, host, 5).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The whole roster walks out while the fetch is pending.
        leave(&registry, guest).await.unwrap();
        leave(&registry, host).await.unwrap();
        assert_eq!(registry.room_count(), 0);

        gate.notify_one();
        let err = racing.await.unwrap().unwrap_err();
        assert!(matches!(err, ServiceError::RoomGone));

        // The dead room was not resurrected by the resuming start.
        assert_eq!(registry.room_count(), 0);
        assert!(matches!(
            registry.lookup_room(room_id),
            Err(ServiceError::RoomNotFound(_))
        ));
    }
}

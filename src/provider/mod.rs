//! Track provider abstraction used by start-game to resolve a playlist.

pub mod spotify;

use std::error::Error;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::state::game::Track;

/// Result alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Error raised by track providers regardless of the underlying service.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider could not be reached or answered with a failure.
    #[error("track provider unavailable: {message}")]
    Unavailable {
        /// Human readable description of the failure.
        message: String,
        /// Underlying transport or decoding error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The provider answered but the playlist does not exist.
    #[error("playlist `{0}` not found")]
    PlaylistNotFound(String),
}

impl ProviderError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        ProviderError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Abstraction over the external music service that resolves playlists.
///
/// The fetch is the only suspension point inside a room operation, so
/// implementations must be cancel-safe: dropping the future leaves no state
/// behind.
pub trait TrackProvider: Send + Sync {
    /// Resolve a playlist reference into its playable tracks.
    ///
    /// The returned sequence may be empty; callers apply their own pool-size
    /// requirements.
    fn tracks_from_playlist(&self, playlist: &str) -> BoxFuture<'static, ProviderResult<Vec<Track>>>;
}

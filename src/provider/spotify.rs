//! Spotify Web API implementation of [`TrackProvider`].
//!
//! Authenticates with the client-credentials flow and pages through the
//! playlist-tracks endpoint. Tracks without a playable preview URL are
//! skipped, since a round cannot be rendered without audio.

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    provider::{ProviderError, ProviderResult, TrackProvider},
    state::game::Track,
};

const ACCOUNTS_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE_URL: &str = "https://api.spotify.com/v1";
const PAGE_LIMIT: usize = 100;

/// Client credentials issued through the Spotify developer dashboard.
#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    /// Application client id.
    pub client_id: String,
    /// Application client secret.
    pub client_secret: String,
}

/// Track provider backed by the Spotify Web API.
#[derive(Clone)]
pub struct SpotifyProvider {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    credentials: SpotifyCredentials,
    accounts_url: Arc<str>,
    api_base_url: Arc<str>,
    // Cached bearer token; refreshed lazily when a request is rejected.
    token: Mutex<Option<String>>,
}

impl SpotifyProvider {
    /// Build a provider from client credentials.
    pub fn new(credentials: SpotifyCredentials) -> ProviderResult<Self> {
        Self::with_endpoints(credentials, ACCOUNTS_URL, API_BASE_URL)
    }

    /// Build a provider against custom endpoints, used by tests.
    pub fn with_endpoints(
        credentials: SpotifyCredentials,
        accounts_url: &str,
        api_base_url: &str,
    ) -> ProviderResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| ProviderError::unavailable("building HTTP client".into(), source))?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                credentials,
                accounts_url: Arc::from(accounts_url.trim_end_matches('/')),
                api_base_url: Arc::from(api_base_url.trim_end_matches('/')),
                token: Mutex::new(None),
            }),
        })
    }
}

impl Inner {
    /// Return the cached bearer token, requesting a fresh one if needed.
    async fn bearer_token(&self, force_refresh: bool) -> ProviderResult<String> {
        let mut slot = self.token.lock().await;
        if !force_refresh
            && let Some(token) = slot.as_ref()
        {
            return Ok(token.clone());
        }

        let response = self
            .client
            .post(self.accounts_url.as_ref())
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|source| ProviderError::unavailable("requesting access token".into(), source))?;

        if !response.status().is_success() {
            return Err(ProviderError::Unavailable {
                message: format!("token endpoint answered {}", response.status()),
                source: format!("status {}", response.status()).into(),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|source| ProviderError::unavailable("decoding access token".into(), source))?;

        debug!(expires_in = token.expires_in, "obtained spotify access token");
        *slot = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    async fn fetch_playlist_tracks(&self, playlist: String) -> ProviderResult<Vec<Track>> {
        let mut token = self.bearer_token(false).await?;
        let mut url = Some(format!(
            "{}/playlists/{playlist}/tracks?limit={PAGE_LIMIT}",
            self.api_base_url
        ));
        let mut tracks = Vec::new();
        let mut skipped = 0usize;

        while let Some(page_url) = url.take() {
            let response = self
                .client
                .get(&page_url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|source| {
                    ProviderError::unavailable("requesting playlist tracks".into(), source)
                })?;

            match response.status() {
                StatusCode::NOT_FOUND => return Err(ProviderError::PlaylistNotFound(playlist)),
                StatusCode::UNAUTHORIZED => {
                    // Cached token expired; refresh once and retry the page.
                    token = self.bearer_token(true).await?;
                    url = Some(page_url);
                    continue;
                }
                status if !status.is_success() => {
                    return Err(ProviderError::Unavailable {
                        message: format!("playlist endpoint answered {status}"),
                        source: format!("status {status}").into(),
                    });
                }
                _ => {}
            }

            let page: PlaylistTracksPage = response.json().await.map_err(|source| {
                ProviderError::unavailable("decoding playlist tracks".into(), source)
            })?;

            for item in page.items {
                let Some(entry) = item.track else { continue };
                match Track::try_from(entry) {
                    Ok(track) => tracks.push(track),
                    Err(_) => skipped += 1,
                }
            }
            url = page.next;
        }

        if skipped > 0 {
            warn!(skipped, "skipped playlist entries without id or preview audio");
        }

        Ok(tracks)
    }
}

impl TrackProvider for SpotifyProvider {
    fn tracks_from_playlist(&self, playlist: &str) -> BoxFuture<'static, ProviderResult<Vec<Track>>> {
        let inner = self.inner.clone();
        let playlist = playlist.to_string();
        Box::pin(async move { inner.fetch_playlist_tracks(playlist).await })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct PlaylistTracksPage {
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<TrackEntry>,
}

#[derive(Debug, Deserialize)]
struct TrackEntry {
    id: Option<String>,
    name: String,
    preview_url: Option<String>,
    #[serde(default)]
    artists: Vec<ArtistEntry>,
}

#[derive(Debug, Deserialize)]
struct ArtistEntry {
    name: String,
}

impl TryFrom<TrackEntry> for Track {
    type Error = ();

    fn try_from(entry: TrackEntry) -> Result<Self, Self::Error> {
        let (Some(id), Some(audio)) = (entry.id, entry.preview_url) else {
            return Err(());
        };
        Ok(Track {
            id,
            audio,
            title: entry.name,
            artists: entry.artists.into_iter().map(|artist| artist.name).collect(),
        })
    }
}

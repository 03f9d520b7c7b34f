//! Jellyfin API client implementation

use crate::jellyfin::models::{ItemsResponse, MediaItem, Track};
use crate::jellyfin::{PlaybackProgressReport, PlaybackStartReport, PlaybackStopReport};
use async_trait::async_trait;
use reqwest::{Client, Error as ReqwestError, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

const LOG_TARGET: &str = "jelly_session::jellyfin::api";

/// Catalog and reporting operations the playback session consumes.
///
/// `JellyfinClient` is the HTTP implementation; tests substitute mocks.
#[async_trait]
pub trait JellyfinApiContract: Send + Sync {
    /// Identifier tying start/progress/stop reports into one server session.
    fn play_session_id(&self) -> &str;

    /// Fetches full details for the given item ids. Order is not guaranteed.
    async fn get_items_details(&self, item_ids: &[String]) -> Result<Vec<MediaItem>, JellyfinError>;

    /// Resolves the URL the audio device should load for an item.
    async fn get_audio_stream_url(&self, item_id: &str) -> Result<String, JellyfinError>;

    /// Artwork URL for a track, if it has a primary image.
    fn get_artwork_url(&self, track: &Track) -> Option<String>;

    async fn report_playback_start(&self, report: &PlaybackStartReport) -> Result<(), JellyfinError>;
    async fn report_playback_progress(&self, report: &PlaybackProgressReport) -> Result<(), JellyfinError>;
    async fn report_playback_stopped(&self, report: &PlaybackStopReport) -> Result<(), JellyfinError>;
}

/// Client for interacting with Jellyfin API
#[derive(Clone)]
pub struct JellyfinClient {
    client: Client,
    server_url: String,
    api_key: Option<String>,
    user_id: Option<String>,
    play_session_id: String,
}

/// Error types for Jellyfin API operations
#[derive(Debug)]
pub enum JellyfinError {
    Network(ReqwestError),
    Authentication(String),
    NotFound(String),
    InvalidResponse(String),
    Other(String),
}

// --- Error Implementations ---

impl fmt::Display for JellyfinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JellyfinError::Network(e) => write!(f, "Network error: {}", e),
            JellyfinError::Authentication(msg) => write!(f, "Authentication error: {}", msg),
            JellyfinError::NotFound(msg) => write!(f, "Not found: {}", msg),
            JellyfinError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            JellyfinError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl Error for JellyfinError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            JellyfinError::Network(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ReqwestError> for JellyfinError {
    fn from(err: ReqwestError) -> Self {
        JellyfinError::Network(err)
    }
}

impl JellyfinError {
    /// True for request timeouts, which the reporter treats as routine.
    pub fn is_timeout(&self) -> bool {
        matches!(self, JellyfinError::Network(e) if e.is_timeout())
    }
}

// --- JellyfinClient Implementation ---

impl JellyfinClient {
    /// Create a new Jellyfin client with the server URL
    pub fn new(server_url: &str) -> Self {
        debug!(target: LOG_TARGET, "Creating new JellyfinClient with server_url: {}", server_url);

        let client = match Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!(target: LOG_TARGET, "Error creating HTTP client with timeout: {:?}. Falling back to default.", e);
                Client::new()
            }
        };

        let normalized_url = server_url.trim_end_matches('/').to_string();
        let play_session_id = Uuid::new_v4().to_string();
        debug!(target: LOG_TARGET, "Generated PlaySessionId: {}", play_session_id);

        JellyfinClient {
            client,
            server_url: normalized_url,
            api_key: None,
            user_id: None,
            play_session_id,
        }
    }

    /// Set API key for authentication
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    /// Set user ID for requests
    pub fn with_user_id(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    // --- Private Helper Methods ---

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    /// Checks if the client has authentication credentials.
    fn ensure_authenticated(&self) -> Result<(&str, &str), JellyfinError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| JellyfinError::Authentication("API key not set".to_string()))?;
        let user_id = self.user_id.as_deref().ok_or_else(|| JellyfinError::Authentication("User ID not set".to_string()))?;
        Ok((api_key, user_id))
    }

    /// Sends a GET request and deserializes the JSON response.
    async fn get_json<T: DeserializeOwned>(&self, path: &str, query_params: Option<&[(&str, &str)]>) -> Result<T, JellyfinError> {
        let (api_key, _) = self.ensure_authenticated()?;
        let url = self.build_url(path);
        debug!(target: LOG_TARGET, "Sending GET request to: {}", url);

        let mut request_builder = self.client.get(&url).header("X-Emby-Token", api_key);
        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }

        let response = request_builder.send().await?;
        Self::handle_response(response).await
    }

    /// Sends a POST request with a JSON body and expects a 204 No Content on success.
    async fn post_json_no_content<T: Serialize>(&self, path: &str, body: &T) -> Result<(), JellyfinError> {
        let (api_key, _) = self.ensure_authenticated()?;
        let url = self.build_url(path);
        trace!(target: LOG_TARGET, "Sending POST request with JSON body to: {}", url);

        let response = self.client
            .post(&url)
            .header("X-Emby-Token", api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::OK {
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_else(|_| "Failed to read error body".to_string());
            Err(Self::status_error(status, error_text))
        }
    }

    /// Handles response status checking and JSON deserialization.
    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, JellyfinError> {
        let status = response.status();
        trace!(target: LOG_TARGET, "Response status: {}", status);

        if status.is_success() {
            let response_text = response.text().await?;
            if response_text.is_empty() {
                error!(target: LOG_TARGET, "Received empty response body with success status {}", status);
                return Err(JellyfinError::InvalidResponse("Empty response body received".to_string()));
            }
            serde_json::from_str::<T>(&response_text).map_err(|e| {
                error!(target: LOG_TARGET, "JSON parsing error: {}", e);
                JellyfinError::InvalidResponse(format!("Failed to parse JSON response: {}", e))
            })
        } else {
            let error_text = response.text().await.unwrap_or_else(|_| "Failed to read error body".to_string());
            Err(Self::status_error(status, error_text))
        }
    }

    fn status_error(status: StatusCode, body: String) -> JellyfinError {
        error!(target: LOG_TARGET, "Request failed. Status: {}, Body: {}", status, body);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                JellyfinError::Authentication(format!("Authentication failed ({}): {}", status, body))
            }
            StatusCode::NOT_FOUND => JellyfinError::NotFound(format!("Resource not found ({}): {}", status, body)),
            _ => JellyfinError::InvalidResponse(format!("Request failed with status {}: {}", status, body)),
        }
    }

    // --- Getter methods (primarily for testing/debugging) ---
    pub fn get_server_url(&self) -> &str { &self.server_url }
    pub fn get_api_key(&self) -> Option<&str> { self.api_key.as_deref() }
    pub fn get_user_id(&self) -> Option<&str> { self.user_id.as_deref() }
}

#[async_trait]
impl JellyfinApiContract for JellyfinClient {
    fn play_session_id(&self) -> &str {
        &self.play_session_id
    }

    async fn get_items_details(&self, item_ids: &[String]) -> Result<Vec<MediaItem>, JellyfinError> {
        debug!(target: LOG_TARGET, "Fetching details for {} item(s)", item_ids.len());
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let (_, user_id) = self.ensure_authenticated()?;
        let ids_param = item_ids.join(",");
        let path = format!("/Users/{}/Items", user_id);
        let params = [
            ("Ids", ids_param.as_str()),
            ("Fields", "MediaSources,Artists,AlbumArtist"),
        ];

        let response: ItemsResponse = self.get_json(&path, Some(&params)).await?;
        debug!(target: LOG_TARGET, "Successfully fetched details for {} items", response.items.len());
        Ok(response.items)
    }

    async fn get_audio_stream_url(&self, item_id: &str) -> Result<String, JellyfinError> {
        let (api_key, _) = self.ensure_authenticated()?;
        let url = format!(
            "{}/Audio/{}/stream?static=true&PlaySessionId={}&api_key={}",
            self.server_url,
            urlencoding::encode(item_id),
            self.play_session_id,
            urlencoding::encode(api_key),
        );
        trace!(target: LOG_TARGET, "Generated stream URL for item {}", item_id);
        Ok(url)
    }

    fn get_artwork_url(&self, track: &Track) -> Option<String> {
        let tag = track.image_tag.as_ref()?;
        Some(format!(
            "{}/Items/{}/Images/Primary?tag={}",
            self.server_url,
            urlencoding::encode(&track.id),
            urlencoding::encode(tag),
        ))
    }

    async fn report_playback_start(&self, report: &PlaybackStartReport) -> Result<(), JellyfinError> {
        info!(target: LOG_TARGET, "Reporting playback start for item_id: {}", report.base.item_id);
        self.post_json_no_content("/Sessions/Playing", report).await
    }

    async fn report_playback_progress(&self, report: &PlaybackProgressReport) -> Result<(), JellyfinError> {
        trace!(target: LOG_TARGET, "Reporting playback progress for item_id: {}, PositionTicks: {}", report.base.item_id, report.base.position_ticks);
        self.post_json_no_content("/Sessions/Playing/Progress", report).await
    }

    async fn report_playback_stopped(&self, report: &PlaybackStopReport) -> Result<(), JellyfinError> {
        info!(target: LOG_TARGET, "Reporting playback stopped for item_id: {}", report.base.item_id);
        self.post_json_no_content("/Sessions/Playing/Stopped", report).await
    }
}

//! Integration tests for Jellyfin client functionality
//!
//! These tests verify that the Jellyfin client components work together correctly.

use crate::test_utils::constants::{TEST_API_KEY, TEST_SERVER_URL, TEST_USER_ID};
use jelly_session::config::Settings;
use jelly_session::jellyfin::{JellyfinApiContract, JellyfinClient, JellyfinError, Track};

#[cfg(test)]
mod jellyfin_integration_tests {
    use super::*;

    fn client_from_settings() -> JellyfinClient {
        let settings = Settings {
            server_url: format!("{}/", TEST_SERVER_URL),
            api_key: Some(TEST_API_KEY.to_string()),
            user_id: Some(TEST_USER_ID.to_string()),
            ..Settings::default()
        };
        let mut client = JellyfinClient::new(&settings.server_url);
        if let Some(api_key) = &settings.api_key {
            client = client.with_api_key(api_key);
        }
        if let Some(user_id) = &settings.user_id {
            client = client.with_user_id(user_id);
        }
        client
    }

    #[test]
    fn test_client_init_with_settings() {
        let client = client_from_settings();
        assert_eq!(client.get_server_url(), TEST_SERVER_URL);
        assert_eq!(client.get_api_key(), Some(TEST_API_KEY));
        assert_eq!(client.get_user_id(), Some(TEST_USER_ID));
    }

    #[tokio::test]
    async fn test_stream_url_escapes_item_id() {
        let client = client_from_settings();
        let url = client.get_audio_stream_url("a b/c").await.unwrap();
        assert!(url.starts_with(&format!("{}/Audio/a%20b%2Fc/stream?static=true&PlaySessionId=", TEST_SERVER_URL)));
        assert!(url.ends_with(&format!("&api_key={}", TEST_API_KEY)));
    }

    #[test]
    fn test_play_session_ids_are_unique_per_client() {
        let a = client_from_settings();
        let b = client_from_settings();
        assert_ne!(a.play_session_id(), b.play_session_id());
    }

    #[tokio::test]
    async fn test_catalog_requires_credentials() {
        let client = JellyfinClient::new("https://test-server.com");
        let result = client.get_items_details(&["id".to_string()]).await;
        assert!(matches!(result, Err(JellyfinError::Authentication(_))));

        // An empty request never touches the network.
        assert!(client.get_items_details(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_artwork_url_requires_tag() {
        let client = client_from_settings();
        assert!(client.get_artwork_url(&Track::new("x", "X", None)).is_none());
    }
}

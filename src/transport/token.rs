//! Short-lived credential issuance.
//!
//! The trusted backend mints a per-session token authorizing the realtime
//! transport; we never hold a long-lived secret here. Tokens are fetched
//! fresh for every session, never cached.

use tracing::debug;

use crate::error::SessionError;

/// Client for the token-issuance endpoint.
pub struct TokenClient {
    endpoint: String,
    client: reqwest::Client,
}

impl TokenClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Fetch a fresh session credential.
    ///
    /// No timeout is imposed; a hung endpoint holds establishment in
    /// `FetchingToken` until it settles.
    pub async fn mint(&self) -> Result<String, SessionError> {
        debug!(endpoint = %self.endpoint, "Fetching session token");

        let resp = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| SessionError::TokenFetch(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SessionError::TokenFetch(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SessionError::TokenFetch(format!("invalid token response: {e}")))?;

        extract_secret(&json).ok_or_else(|| {
            SessionError::TokenFetch("token response missing client_secret.value".to_string())
        })
    }
}

/// Pull the ephemeral secret out of the issuance response.
fn extract_secret(json: &serde_json::Value) -> Option<String> {
    json["client_secret"]["value"]
        .as_str()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_secret_from_issuance_response() {
        let json = serde_json::json!({
            "id": "sess_1",
            "client_secret": {"value": "ek_abc", "expires_at": 1}
        });
        assert_eq!(extract_secret(&json).as_deref(), Some("ek_abc"));
    }

    #[test]
    fn test_missing_secret_is_none() {
        assert!(extract_secret(&serde_json::json!({"id": "sess_1"})).is_none());
        assert!(extract_secret(&serde_json::json!({"client_secret": {}})).is_none());
    }
}

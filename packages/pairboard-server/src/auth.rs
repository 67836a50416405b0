//! Resolves a connection token to a document id and capability mode via the
//! external codespace API.

use std::time::Duration;

use pairboard_core::Mode;
use serde::Deserialize;
use tracing::warn;

/// Outcome of [`AuthClient::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted { document_id: String, mode: Mode },
    /// The peer must be closed `1011` with this reason.
    Rejected(&'static str),
}

#[derive(Deserialize)]
struct CodespaceResponse {
    uuid: String,
    mode: String,
}

/// Client for the external codespace-authentication API.
///
/// A single call resolves `token -> (document_id, mode)`. Network errors,
/// non-200 responses, and unparsable bodies are all folded into
/// `Rejected("Invalid token")` -- the peer never sees backend-specific
/// failure detail.
pub struct AuthClient {
    http: reqwest::Client,
    api_base: String,
}

impl AuthClient {
    pub fn new(api_base: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder with a timeout cannot fail");

        Self { http, api_base }
    }

    pub async fn authenticate(&self, token: &str) -> AuthOutcome {
        if token.is_empty() {
            return AuthOutcome::Rejected("Missing token");
        }

        let url = format!(
            "{}/codespace/{token}/?fields=uuid,mode",
            self.api_base.trim_end_matches('/')
        );

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "auth request failed");
                return AuthOutcome::Rejected("Invalid token");
            }
        };

        if !response.status().is_success() {
            return AuthOutcome::Rejected("Invalid token");
        }

        match response.json::<CodespaceResponse>().await {
            Ok(body) => AuthOutcome::Granted {
                document_id: body.uuid,
                mode: Mode::parse(&body.mode),
            },
            Err(err) => {
                warn!(%err, "auth response body was not the expected shape");
                AuthOutcome::Rejected("Invalid token")
            }
        }
    }
}

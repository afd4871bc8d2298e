//! Authenticated REST helper shared by the GKE and GCE clients.
//!
//! Reads go through [`GcpApi::get`]; creations go through
//! [`GcpApi::post_operation`], which only checks the operation status and
//! discards the body (the creators poll the resource itself afterwards).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::CloudError;

/// Default timeout for a single API request. The run-wide provisioning
/// deadline is enforced by the coordinator, not here.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Bearer-token REST client for Google APIs.
#[derive(Clone)]
pub struct GcpApi {
    client: Client,
    access_token: String,
}

impl GcpApi {
    /// Create a new API helper with the given `OAuth2` access token.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(access_token: impl Into<String>) -> Result<Self, CloudError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(CloudError::Http)?;

        Ok(Self {
            client,
            access_token: access_token.into(),
        })
    }

    /// Make an authenticated GET request.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, CloudError> {
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make an authenticated POST request whose response body (a
    /// long-running operation) is not needed.
    pub(crate) async fn post_operation<B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<(), CloudError> {
        debug!(url = %url, "POST request (operation)");

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(Self::classify(status, text))
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, CloudError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "failed to parse response");
                CloudError::Serialization(e)
            })
        } else {
            Err(Self::classify(status, text))
        }
    }

    fn classify(status: StatusCode, message: String) -> CloudError {
        if status == StatusCode::NOT_FOUND {
            CloudError::NotFound(message)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            CloudError::Auth(message)
        } else {
            CloudError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

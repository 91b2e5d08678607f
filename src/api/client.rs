//! Shared HTTP plumbing for every backend area.
//!
//! Each call is one request with no retry: a non-2xx status becomes
//! `CrmError::Api`, a connection failure `CrmError::Transport`.

use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::types::{CrmError, CrmResult};

/// reqwest-backed client for the CRM backend.
///
/// Implements every trait in [`crate::api`].
#[derive(Clone)]
pub struct CrmClient {
    http: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl CrmClient {
    pub fn new(config: &BackendConfig, token: Option<SecretString>) -> CrmResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| CrmError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Client for `base_url` with default timeouts, no token.
    pub fn with_base_url(base_url: &str) -> CrmResult<Self> {
        let config = BackendConfig {
            base_url: base_url.to_string(),
            ..BackendConfig::default()
        };
        Self::new(&config, None)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // -- Request helpers -------------------------------------------------

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> CrmResult<T> {
        let req = self.http.get(self.url(path));
        self.execute(path, req).await
    }

    pub(crate) async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> CrmResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let req = self.http.request(method, self.url(path)).json(body);
        self.execute(path, req).await
    }

    async fn execute<T: DeserializeOwned>(&self, path: &str, req: RequestBuilder) -> CrmResult<T> {
        let endpoint = path.split('?').next().unwrap_or(path).to_string();
        let req = match &self.token {
            Some(token) => req.bearer_auth(token.expose_secret()),
            None => req,
        };

        debug!(endpoint = %endpoint, "Backend request");

        let resp = req.send().await.map_err(|source| CrmError::Transport {
            endpoint: endpoint.clone(),
            source,
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(endpoint = %endpoint, status = status.as_u16(), "Backend error");
            return Err(CrmError::Api {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await.map_err(|source| CrmError::Transport {
            endpoint: endpoint.clone(),
            source,
        })?;
        let bytes: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };

        serde_json::from_slice(bytes).map_err(|e| CrmError::Decode {
            endpoint,
            message: e.to_string(),
        })
    }
}

/// Percent-encode a single path segment (complex names are Cyrillic).
pub(crate) fn segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

//! HTTP side channel to the control server: liveness and identity registration.

use std::time::Duration;

use async_trait::async_trait;
use guardian_types::DeviceIdentity;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::ProtocolError;

/// Body the server returns when an identity is already registered.
pub const DEFAULT_DUPLICATE_SENTINEL: &str = "UID уже существует";

/// Coarse process liveness, announced at start and stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Connect,
    Disconnect,
}

impl Liveness {
    /// Value of the `action` query parameter.
    pub fn action(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
        }
    }
}

impl std::fmt::Display for Liveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.action())
    }
}

/// Outcome of a successful registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    /// The server already knew this identity. Not an error.
    AlreadyRegistered,
}

/// Plain request/response calls to the control server.
#[async_trait]
pub trait ServerApi: Send + Sync + 'static {
    /// Announce process liveness. The response body is not interpreted.
    async fn announce(&self, liveness: Liveness) -> Result<(), ProtocolError>;

    /// Register this installation's identity. Idempotent on the server side.
    async fn register(&self, identity: &DeviceIdentity) -> Result<Registration, ProtocolError>;
}

/// Addressing and timeout options for [`HttpServerApi`].
#[derive(Debug, Clone)]
pub struct ApiOptions {
    /// Control server base address, e.g. `http://localhost:3000`.
    pub server_url: String,
    /// Path of the registration endpoint, relative to `server_url`.
    pub register_path: String,
    pub duplicate_sentinel: String,
    pub request_timeout: Duration,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            register_path: "/saveUid".to_string(),
            duplicate_sentinel: DEFAULT_DUPLICATE_SENTINEL.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    uid: &'a str,
}

/// [`ServerApi`] over HTTP with reqwest.
pub struct HttpServerApi {
    client: reqwest::Client,
    base: Url,
    register_url: Url,
    duplicate_sentinel: String,
}

impl HttpServerApi {
    pub fn new(options: &ApiOptions) -> Result<Self, ProtocolError> {
        let base = Url::parse(&options.server_url)
            .map_err(|e| ProtocolError::InvalidAddress(format!("{}: {e}", options.server_url)))?;
        let register_url = base.join(&options.register_path).map_err(|e| {
            ProtocolError::InvalidAddress(format!("{}: {e}", options.register_path))
        })?;
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base,
            register_url,
            duplicate_sentinel: options.duplicate_sentinel.clone(),
        })
    }

    /// URL of the liveness request for `liveness`.
    pub fn liveness_url(&self, liveness: Liveness) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("action", liveness.action());
        url
    }

    pub fn register_url(&self) -> &Url {
        &self.register_url
    }
}

#[async_trait]
impl ServerApi for HttpServerApi {
    async fn announce(&self, liveness: Liveness) -> Result<(), ProtocolError> {
        let url = self.liveness_url(liveness);
        let resp = self.client.get(url).send().await?.error_for_status()?;
        debug!(%liveness, status = %resp.status(), "liveness announced");
        Ok(())
    }

    async fn register(&self, identity: &DeviceIdentity) -> Result<Registration, ProtocolError> {
        let resp = self
            .client
            .post(self.register_url.clone())
            .json(&RegisterBody {
                uid: identity.as_str(),
            })
            .send()
            .await?
            .error_for_status()?;
        let body = resp.text().await?;
        debug!(body = %body, "registration response");
        Ok(classify_registration(&body, &self.duplicate_sentinel))
    }
}

/// Map a successful registration response body to its outcome.
pub fn classify_registration(body: &str, duplicate_sentinel: &str) -> Registration {
    if body == duplicate_sentinel {
        Registration::AlreadyRegistered
    } else {
        Registration::Registered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_urls_carry_action() {
        let api = HttpServerApi::new(&ApiOptions::default()).unwrap();
        assert_eq!(
            api.liveness_url(Liveness::Connect).as_str(),
            "http://localhost:3000/?action=connect"
        );
        assert_eq!(
            api.liveness_url(Liveness::Disconnect).as_str(),
            "http://localhost:3000/?action=disconnect"
        );
    }

    #[test]
    fn register_url_joins_path() {
        let api = HttpServerApi::new(&ApiOptions {
            server_url: "http://10.0.0.5:3000".to_string(),
            ..ApiOptions::default()
        })
        .unwrap();
        assert_eq!(api.register_url().as_str(), "http://10.0.0.5:3000/saveUid");
    }

    #[test]
    fn rejects_invalid_base() {
        let result = HttpServerApi::new(&ApiOptions {
            server_url: "localhost 3000".to_string(),
            ..ApiOptions::default()
        });
        assert!(matches!(result, Err(ProtocolError::InvalidAddress(_))));
    }

    #[test]
    fn duplicate_sentinel_is_already_registered() {
        assert_eq!(
            classify_registration(DEFAULT_DUPLICATE_SENTINEL, DEFAULT_DUPLICATE_SENTINEL),
            Registration::AlreadyRegistered
        );
    }

    #[test]
    fn other_bodies_are_registered() {
        assert_eq!(
            classify_registration("UID сохранен", DEFAULT_DUPLICATE_SENTINEL),
            Registration::Registered
        );
        assert_eq!(
            classify_registration("", DEFAULT_DUPLICATE_SENTINEL),
            Registration::Registered
        );
        // Only an exact match counts.
        assert_eq!(
            classify_registration(" UID уже существует ", DEFAULT_DUPLICATE_SENTINEL),
            Registration::Registered
        );
    }
}

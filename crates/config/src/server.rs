use secrecy::SecretString;
use serde::Deserialize;

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

/// HTTP-layer settings: where to bind, and the shared key clients authenticate with.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_address: String,
    /// Shared secret checked against `Authorization: Bearer <api_key>`.
    ///
    /// `None` disables authentication entirely — only suitable for local development.
    pub api_key: Option<SecretString>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            api_key: None,
        }
    }
}

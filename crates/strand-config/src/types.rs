use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default per-request deadline when a message carries no `timeoutMs`.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// How long `shutdown()` waits for live sessions to drain before
/// force-closing them.
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Server configuration.
///
/// Deserializes from YAML, or is built programmatically via
/// [`ServerConfig::new`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the listener binds, e.g. `127.0.0.1:7070`. Port 0 asks the
    /// OS for an ephemeral port.
    pub bind: String,

    /// PEM certificate and key; absence means plain TCP.
    #[serde(default)]
    pub tls: Option<TlsSettings>,

    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl ServerConfig {
    pub fn new(bind: impl Into<String>) -> Self {
        Self {
            bind: bind.into(),
            tls: None,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            shutdown_timeout_ms: SHUTDOWN_TIMEOUT_MS,
        }
    }

    pub fn with_tls(mut self, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        self.tls = Some(TlsSettings {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        });
        self
    }

    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    pub fn with_shutdown_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.shutdown_timeout_ms = timeout_ms;
        self
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_shutdown_timeout_ms() -> u64 {
    SHUTDOWN_TIMEOUT_MS
}

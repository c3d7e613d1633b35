//! # strand-config
//!
//! Configuration parsing and validation for strand RPC servers.
//!
//! ## Quick Start
//!
//! ```rust
//! use strand_config::{parse_config_from_str, validate_config};
//!
//! let yaml = r#"
//! bind: 127.0.0.1:7070
//! default_timeout_ms: 2500
//! "#;
//!
//! let config = parse_config_from_str(yaml).expect("valid config");
//! validate_config(&config).expect("validation passes");
//!
//! assert_eq!(config.bind, "127.0.0.1:7070");
//! assert_eq!(config.default_timeout_ms, 2500);
//! ```
//!
//! ## Validation Rules
//!
//! - The bind address must be non-empty
//! - Timeouts must be positive
//! - TLS, when present, needs both a certificate and a key path

pub mod error;
pub mod parser;
pub mod types;
pub mod validator;

pub use error::{ConfigError, Result};
pub use parser::{parse_config, parse_config_from_str};
pub use types::{ServerConfig, TlsSettings, DEFAULT_TIMEOUT_MS, SHUTDOWN_TIMEOUT_MS};
pub use validator::validate_config;

use crate::{ConfigError, Result, ServerConfig};

pub fn validate_config(config: &ServerConfig) -> Result<()> {
    if config.bind.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "bind address is empty".to_string(),
        ));
    }

    if config.default_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "default_timeout_ms must be positive".to_string(),
        ));
    }

    if config.shutdown_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "shutdown_timeout_ms must be positive".to_string(),
        ));
    }

    if let Some(tls) = &config.tls {
        if tls.cert_path.as_os_str().is_empty() || tls.key_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "tls requires both cert_path and key_path".to_string(),
            ));
        }
    }

    Ok(())
}

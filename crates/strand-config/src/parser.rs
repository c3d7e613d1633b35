use crate::{ConfigError, Result, ServerConfig};
use std::path::Path;

pub fn parse_config(path: &Path) -> Result<ServerConfig> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;

    parse_config_from_str(&content)
}

pub fn parse_config_from_str(yaml: &str) -> Result<ServerConfig> {
    serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
}

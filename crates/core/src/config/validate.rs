use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - ffmpeg path is not empty
/// - Event channel has room for at least one event
/// - A configured inhibit command names a program
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.encoder.ffmpeg_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "encoder.ffmpeg_path cannot be empty".to_string(),
        ));
    }

    if config.encoder.event_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "encoder.event_capacity must be greater than 0".to_string(),
        ));
    }

    if let Some(command) = &config.power.inhibit_command {
        if command.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "power.inhibit_command must name a program".to_string(),
            ));
        }
    }

    Ok(())
}

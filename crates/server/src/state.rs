use std::sync::Arc;

use encodeall_core::encoder::{
    CommandInhibitor, EncoderCapabilities, EncodingSupervisor, SleepInhibitor,
};
use encodeall_core::Config;
use tracing::{info, warn};

/// Shared application state
pub struct AppState {
    config: Config,
    supervisor: EncodingSupervisor,
    capabilities: EncoderCapabilities,
}

impl AppState {
    pub fn new(
        config: Config,
        supervisor: EncodingSupervisor,
        capabilities: EncoderCapabilities,
    ) -> Self {
        Self {
            config,
            supervisor,
            capabilities,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn supervisor(&self) -> &EncodingSupervisor {
        &self.supervisor
    }

    pub fn capabilities(&self) -> &EncoderCapabilities {
        &self.capabilities
    }
}

/// Builds the supervisor with the sleep inhibitor the power config asks for.
pub fn create_supervisor(config: &Config) -> EncodingSupervisor {
    let supervisor = EncodingSupervisor::new(config.encoder.clone());
    if !config.power.inhibit_sleep {
        info!("Sleep inhibition disabled in config");
        return supervisor;
    }

    let inhibitor = match &config.power.inhibit_command {
        Some(command) => Some(CommandInhibitor::new(command.clone())),
        None => CommandInhibitor::platform_default(),
    };
    match inhibitor {
        Some(inhibitor) => {
            info!("Using sleep inhibitor: {}", inhibitor.name());
            supervisor.with_inhibitor(Arc::new(inhibitor))
        }
        None => {
            warn!("No sleep inhibitor available on this platform");
            supervisor
        }
    }
}

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

pub use crate::encoder::EncoderConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub power: PowerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8686
}

/// Sleep inhibition while jobs run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PowerConfig {
    #[serde(default = "default_inhibit_sleep")]
    pub inhibit_sleep: bool,
    /// Helper command kept running while inhibiting (program then arguments).
    /// Defaults to the platform helper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inhibit_command: Option<Vec<String>>,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            inhibit_sleep: default_inhibit_sleep(),
            inhibit_command: None,
        }
    }
}

fn default_inhibit_sleep() -> bool {
    true
}

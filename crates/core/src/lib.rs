pub mod config;
pub mod encoder;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError, PowerConfig, ServerConfig,
};
pub use encoder::{
    EncoderConfig, EncoderError, EncodingEvent, EncodingPlan, EncodingRequest,
    EncodingSupervisor, JobOutcome, JobTicket,
};

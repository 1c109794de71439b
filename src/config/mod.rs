/// Configuration file and environment handling
#[allow(clippy::module_inception)]
pub mod config;

pub use config::{
    enabled_flag_from_env, parse_enabled_flag, resolve_enabled_flag, Config, MonitorConfig,
    ENABLED_ENV_VAR,
};

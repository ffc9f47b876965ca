pub use self::parser::{
    API_TOKEN_PROPERTY, CalendarConfig, Config, ContainersConfig, LoggingConfig, SlackConfig,
    StorageConfig, StorageKind,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;

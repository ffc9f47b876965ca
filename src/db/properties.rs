use std::collections::BTreeMap;

use crate::config::Config;
use crate::db::PropertySource;
use crate::utils::{AppError, AppResult};

/// Properties taken from the `properties` section of the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigProperties {
    values: BTreeMap<String, String>,
}

impl ConfigProperties {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.properties.clone())
    }
}

impl PropertySource for ConfigProperties {
    fn get_property(&self, key: &str) -> AppResult<String> {
        match self.values.get(key) {
            Some(value) if !value.trim().is_empty() => Ok(value.clone()),
            _ => Err(AppError::Configuration(format!("property '{key}' is not set"))),
        }
    }

    fn exists(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

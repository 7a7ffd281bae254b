use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_currency() -> String {
    "BRL".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            currency: default_currency(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

// src/settings.rs

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

const DEFAULT_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_LLM_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_LLM_MODEL: &str = "llama3-70b-8192";
const DEFAULT_CATALOG_URL: &str = "https://api.flexoffers.com/v3/products/full";
const ENV_PREFIX: &str = "SEARCH";

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Path to the certificate file.
    #[arg(long, value_name = "CERT_PATH", requires = "key")]
    pub cert: Option<PathBuf>,

    /// Path to the key file.
    #[arg(long, value_name = "KEY_PATH", requires = "cert")]
    pub key: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Web {
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub address: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Base URL of an OpenAI-compatible API, without `/chat/completions`.
    pub url: String,
    pub model: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Settings {
    pub web: Web,
    pub llm: LlmSettings,
    pub catalog: CatalogSettings,
}

impl Settings {
    /// Load settings from an optional TOML file and `SEARCH__*` environment
    /// variables, with sane defaults. API keys have no default.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX).separator("__"))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::<DefaultState>::default()
            .set_default("web.address", DEFAULT_ADDR)?
            .set_default("llm.url", DEFAULT_LLM_URL)?
            .set_default("llm.model", DEFAULT_LLM_MODEL)?
            .set_default("catalog.url", DEFAULT_CATALOG_URL)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let settings: Self = builder.add_source(env).build()?.try_deserialize()?;
        settings.check_secrets()?;
        Ok(settings)
    }

    fn check_secrets(&self) -> Result<(), ConfigError> {
        if self.llm.api_key.trim().is_empty() {
            return Err(ConfigError::Message("llm.api_key must not be empty".into()));
        }
        if self.catalog.api_key.trim().is_empty() {
            return Err(ConfigError::Message(
                "catalog.api_key must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::player::DEFAULT_REPLAY_BASE;
use crate::resolver::ResolverSettings;

const DEFAULT_PAGE_HREF: &str = "http://localhost/embed/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read embed config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse page href: {0}")]
    InvalidHref(#[from] url::ParseError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Address of the embed page without its query string.
    pub page_href: String,
    pub replay_base: String,
    pub resolver: ResolverSettings,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            page_href: DEFAULT_PAGE_HREF.to_string(),
            replay_base: DEFAULT_REPLAY_BASE.to_string(),
            resolver: ResolverSettings::default(),
        }
    }
}

impl EmbedConfig {
    /// Load the config at `config_path`, falling back to defaults when no
    /// path is given or the file does not exist.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                serde_yaml::from_str(&contents)?
            }
            _ => Self::default(),
        };
        Url::parse(&config.page_href)?;
        Ok(config)
    }

    /// The page's own href for a given query string; this is the identity
    /// every outgoing envelope carries.
    pub fn identity_for(&self, query: &str) -> Result<String, ConfigError> {
        let mut href = Url::parse(&self.page_href)?;
        let query = query.trim_start_matches('?');
        href.set_query((!query.is_empty()).then_some(query));
        Ok(href.to_string())
    }
}

use crate::api::DEFAULT_ENDPOINT;
use crate::error::Error;
use crate::hashes::DEFAULT_PREFIX_BYTES;
use crate::types::{ClientInfo, ListIdentity, PlatformType, ThreatEntryType, ThreatType};
use std::env;

const DEFAULT_KEY_PREFIX: &str = "safebrowse";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_CLIENT_ID: &str = "safebrowse-rs";

#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the remote threat service.
    pub api_key: String,
    pub client_id: String,
    pub client_version: String,
    pub endpoint: String,
    pub redis_url: String,
    /// Namespace prefix for every persisted key. Must stay stable across
    /// restarts for the deadline and list states to survive.
    pub key_prefix: String,
    pub prefix_bytes: usize,
    /// The (threat, platform, entry) triples kept in sync.
    pub lists: Vec<ListIdentity>,
}

impl Config {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            prefix_bytes: DEFAULT_PREFIX_BYTES,
            lists: default_lists(),
        }
    }

    pub fn from_env() -> Result<Self, Error> {
        let api_key = env::var("SAFEBROWSE_API_KEY")
            .map_err(|_| Error::Config("SAFEBROWSE_API_KEY is not set".to_string()))?;
        let mut config = Self::new(api_key);
        if let Ok(value) = env::var("SAFEBROWSE_CLIENT_ID") {
            config.client_id = value;
        }
        if let Ok(value) = env::var("SAFEBROWSE_CLIENT_VERSION") {
            config.client_version = value;
        }
        if let Ok(value) = env::var("SAFEBROWSE_ENDPOINT") {
            config.endpoint = value;
        }
        if let Ok(value) = env::var("SAFEBROWSE_REDIS") {
            config.redis_url = value;
        }
        if let Ok(value) = env::var("SAFEBROWSE_KEY_PREFIX") {
            config.key_prefix = value;
        }
        Ok(config)
    }

    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            client_id: self.client_id.clone(),
            client_version: self.client_version.clone(),
        }
    }
}

/// The lists tracked when none are configured explicitly.
pub fn default_lists() -> Vec<ListIdentity> {
    vec![
        ListIdentity::new(
            ThreatType::Malware,
            PlatformType::AnyPlatform,
            ThreatEntryType::Url,
        ),
        ListIdentity::new(
            ThreatType::SocialEngineering,
            PlatformType::AnyPlatform,
            ThreatEntryType::Url,
        ),
        ListIdentity::new(
            ThreatType::PotentiallyHarmfulApplication,
            PlatformType::Android,
            ThreatEntryType::Url,
        ),
        ListIdentity::new(
            ThreatType::PotentiallyHarmfulApplication,
            PlatformType::Ios,
            ThreatEntryType::Url,
        ),
        ListIdentity::new(
            ThreatType::UnwantedSoftware,
            PlatformType::AnyPlatform,
            ThreatEntryType::Url,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_standard_lists() {
        let config = Config::new("key");
        assert_eq!(config.lists.len(), 5);
        assert_eq!(config.prefix_bytes, DEFAULT_PREFIX_BYTES);
        assert_eq!(config.key_prefix, "safebrowse");
        let codes: Vec<String> = config.lists.iter().map(ListIdentity::code).collect();
        assert!(codes.contains(&"111".to_string()));
        assert!(codes.contains(&"371".to_string()));
        assert!(codes.contains(&"381".to_string()));
    }
}

//! Backend connection configuration
//!
//! `ApiConfig` is constructed once at composition time and handed to every
//! collaborator that talks to the backend. There is no process-wide mutable
//! copy: changing a value means building a new config with the `with_*`
//! methods and passing it down again.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Identity/context hash sent (stringified) with every chat request.
pub type CicHash = BTreeMap<String, i64>;

/// Free-form username hash sent as a JSON object.
pub type UsernameHash = serde_json::Map<String, serde_json::Value>;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3002";
pub const DEFAULT_USER_ID: &str = "1000001805422";
pub const DEFAULT_GRPC_PORT: u16 = 50051;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

const DEFAULT_CIC_ENTRIES: &[(&str, i64)] = &[
    ("1804860", 0),
    ("9296571", 0),
    ("11298302", 0),
    ("27867814", 0),
    ("330516745", 2),
    ("1017908760", 0),
    ("1412961043", 0),
    ("2927642976", 0),
    ("1000000017777", 0),
    ("1000000122459", 0),
    ("1000000283372", 0),
    ("1000000429887", 0),
    ("1000001166105", 0),
    ("1000001267242", 0),
    ("1000001292440", 0),
    ("1000001296046", 0),
    ("1000001422272", 0),
    ("1000001558383", 0),
    ("1000002929181", 0),
    ("10264309808", 0),
    ("4000000007480", 0),
    ("4000000008460", 0),
    ("4000000008542", 0),
    ("4000000008567", 0),
    ("4000000008569", 0),
    ("4000000008573", 0),
    ("4000000008655", 0),
    ("4000000009039", 0),
    ("4000000010497", 0),
    ("4000000010521", 0),
    ("4000000010543", 0),
    ("4000000010545", 0),
    ("4000000010923", 0),
    ("4000000011501", 0),
    ("4000000013733", 0),
];

/// CIC hash used when nothing else is configured.
pub fn default_cic_hash() -> CicHash {
    DEFAULT_CIC_ENTRIES
        .iter()
        .map(|(id, value)| (id.to_string(), *value))
        .collect()
}

/// Geographic position reported to the backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl UserLocation {
    /// New York, the default search location
    pub const NEW_YORK: UserLocation = UserLocation {
        latitude: 40.7128,
        longitude: -74.006,
    };
}

impl Default for UserLocation {
    fn default() -> Self {
        Self::NEW_YORK
    }
}

/// Connection settings for the conversation backend
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub default_user_id: String,
    pub default_cic_hash: CicHash,
    pub default_username_hash: UsernameHash,
    pub grpc_port: u16,
    pub user_location: UserLocation,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_user_id: DEFAULT_USER_ID.to_string(),
            default_cic_hash: default_cic_hash(),
            default_username_hash: UsernameHash::new(),
            grpc_port: DEFAULT_GRPC_PORT,
            user_location: UserLocation::default(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl ApiConfig {
    /// Defaults overridden by `PCS_API_BASE_URL`, `PCS_USER_ID`,
    /// `PCS_GRPC_PORT` and `PCS_TIMEOUT_MS` (a `.env` file is honoured).
    ///
    /// Unparseable numeric values are logged and ignored.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Ok(url) = std::env::var("PCS_API_BASE_URL") {
            config = config.with_base_url(url);
        }
        if let Ok(user_id) = std::env::var("PCS_USER_ID") {
            config = config.with_user_id(user_id);
        }
        if let Ok(port) = std::env::var("PCS_GRPC_PORT") {
            match port.parse() {
                Ok(port) => config.grpc_port = port,
                Err(e) => tracing::warn!(value = %port, error = %e, "Ignoring invalid PCS_GRPC_PORT"),
            }
        }
        if let Ok(timeout) = std::env::var("PCS_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(ms) => config.timeout = Duration::from_millis(ms),
                Err(e) => {
                    tracing::warn!(value = %timeout, error = %e, "Ignoring invalid PCS_TIMEOUT_MS")
                }
            }
        }

        config
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.default_user_id = user_id.into();
        self
    }

    pub fn with_cic_hash(mut self, cic_hash: CicHash) -> Self {
        self.default_cic_hash = cic_hash;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Per-user chat configuration edited in the chat tab and persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    pub grpc_port: u16,
    pub user_id: String,
    pub user_location: UserLocation,
    pub cic_hash: CicHash,
    pub username_hash: UsernameHash,
    /// Label of the user picked in the config panel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_user: Option<String>,
    /// Label of the location picked in the config panel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_location: Option<String>,
}

impl ChatConfig {
    pub fn from_api_config(api: &ApiConfig) -> Self {
        Self {
            grpc_port: api.grpc_port,
            user_id: api.default_user_id.clone(),
            user_location: api.user_location,
            cic_hash: api.default_cic_hash.clone(),
            username_hash: api.default_username_hash.clone(),
            selected_user: Some("stephen".to_string()),
            selected_location: Some("nyc".to_string()),
        }
    }

    /// Serialized form of the CIC hash as the backend expects it.
    pub fn cic_hash_json(&self) -> String {
        stringify_cic_hash(&self.cic_hash)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::from_api_config(&ApiConfig::default())
    }
}

pub fn stringify_cic_hash(cic_hash: &CicHash) -> String {
    // A map of string keys to integers always serializes.
    serde_json::to_string(cic_hash).unwrap_or_else(|_| "{}".to_string())
}

/// Commit a JSON field edited as text.
///
/// Returns the parsed value, or the last valid value when the edit does not
/// parse. Invalid edits are dropped without surfacing an error.
pub fn commit_json_edit<T>(current: &T, edited: &str) -> T
where
    T: DeserializeOwned + Clone,
{
    match serde_json::from_str(edited) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Discarding unparseable JSON edit");
            current.clone()
        }
    }
}

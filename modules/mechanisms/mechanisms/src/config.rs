//! Global mechanism configuration and config decoding helpers.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use mechanisms_sdk::MechanismError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Environment variable prefix layered over the YAML document.
pub const ENV_PREFIX: &str = "GATEHOUSE_";

/// Mechanism catalogue: one prototype is built per entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MechanismsConfig {
    pub authenticators: Vec<MechanismConfig>,
    pub authorizers: Vec<MechanismConfig>,
}

/// A single configured mechanism.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MechanismConfig {
    pub id: String,
    /// Registered mechanism kind, e.g. `jwt` or `remote`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Option<Value>,
}

/// Reference from a rule to a prototype, with optional per-rule overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MechanismRef {
    pub id: String,
    #[serde(default)]
    pub config: Option<Value>,
}

impl MechanismRef {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }
}

impl MechanismsConfig {
    /// Loads the catalogue from a YAML file, layered with `GATEHOUSE_`
    /// environment variables (`__` separates nested keys).
    ///
    /// # Errors
    /// Returns an error if the file cannot be parsed or does not match the
    /// expected shape.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("failed to load mechanism configuration from {}", path.display()))
    }

    /// Builds the catalogue from an already parsed document.
    ///
    /// # Errors
    /// Returns [`MechanismError::Configuration`] if the document does not
    /// match the expected shape.
    pub fn from_value(value: Value) -> Result<Self, MechanismError> {
        serde_json::from_value(value)
            .map_err(|e| MechanismError::Configuration(format!("invalid mechanism catalogue: {e}")))
    }
}

/// Decodes a raw mechanism config. A missing config decodes as `{}`.
pub(crate) fn decode<T>(kind: &str, id: &str, raw: Option<&Value>) -> Result<T, MechanismError>
where
    T: DeserializeOwned,
{
    let value = match raw {
        None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
        Some(value) => value.clone(),
    };

    serde_json::from_value(value).map_err(|e| {
        MechanismError::Configuration(format!(
            "failed decoding config for {kind} mechanism '{id}': {e}"
        ))
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

fn parse_duration(raw: RawDuration) -> Result<Duration, String> {
    match raw {
        RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => {
            humantime::parse_duration(text.trim()).map_err(|e| format!("invalid duration '{text}': {e}"))
        }
    }
}

/// Serde helpers for durations written as `"5m"` or as integer seconds.
pub(crate) mod duration {
    use super::{Deserialize, Deserializer, Duration, RawDuration, parse_duration};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawDuration::deserialize(deserializer)?;
        parse_duration(raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::{Deserialize, Deserializer, Duration, RawDuration, parse_duration};

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<RawDuration>::deserialize(deserializer)?
                .map(parse_duration)
                .transpose()
                .map_err(serde::de::Error::custom)
        }
    }
}

//! Stage configuration
//!
//! Every setting is looked up in two places: the process environment first,
//! then a properties file addressed by dotted keys. A blank value counts as
//! unset. Stage configs are resolved once before a stage is constructed; a
//! missing setting is a [`ConfigError`] and the stage never starts.

use crate::messaging::Topic;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

// ============================================================================
// Setting Keys
// ============================================================================

/// Environment variable naming the properties file.
pub const CONFIG_FILE_ENV: &str = "USERFLOW_CONFIG";

/// Properties file used when `USERFLOW_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "userflow.toml";

/// A setting addressable by environment variable or property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingKey {
    pub name: &'static str,
    pub env: &'static str,
    pub property: &'static str,
}

pub const INGEST_OUTPUT_TOPIC: SettingKey = SettingKey {
    name: "Ingest SNS topic ARN",
    env: "SNS_INGEST_TO_TRANSFORM_TOPIC_ARN",
    property: "aws.sns.destination",
};

pub const TRANSFORM_OUTPUT_TOPIC: SettingKey = SettingKey {
    name: "Transform SNS topic ARN",
    env: "SNS_TRANSFORM_TO_DYNAMO_TOPIC_ARN",
    property: "aws.sns.destination",
};

pub const FANOUT_TOPIC: SettingKey = SettingKey {
    name: "Fanout SNS topic ARN",
    env: "SNS_USER_MIGRATION_FANOUT_TOPIC_ARN",
    property: "aws.sns.fanout-destination",
};

pub const STORE_TABLE: SettingKey = SettingKey {
    name: "DynamoDB table name",
    env: "DYNAMODB_TABLE_NAME",
    property: "aws.dynamodb.table",
};

pub const UPLOAD_BUCKET: SettingKey = SettingKey {
    name: "S3 bucket",
    env: "S3_BUCKET",
    property: "aws.s3.bucket",
};

pub const MALFORMED_ROW_POLICY: SettingKey = SettingKey {
    name: "Malformed row policy",
    env: "TRANSFORM_MALFORMED_ROWS",
    property: "transform.malformed-rows",
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} not configured. Set the {env} environment variable or the {property} property.")]
    Missing {
        name: &'static str,
        env: &'static str,
        property: &'static str,
    },

    #[error("Failed to load properties: {0}")]
    Properties(#[from] config::ConfigError),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

// ============================================================================
// Config Source
// ============================================================================

/// Snapshot of the environment plus the loaded properties.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    env: HashMap<String, String>,
    properties: config::Config,
}

impl ConfigSource {
    /// Load `.env`, snapshot the process environment and read the properties
    /// file named by `USERFLOW_CONFIG` (or `userflow.toml`) if it exists.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let env: HashMap<String, String> = std::env::vars().collect();
        let path = env
            .get(CONFIG_FILE_ENV)
            .filter(|p| !p.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        Self::with_properties_file(env, path)
    }

    /// Build a source from an explicit environment and an optional file.
    /// The file format is inferred from its extension.
    pub fn with_properties_file(
        env: HashMap<String, String>,
        path: impl AsRef<Path>,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading properties file");

        let properties = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .build()?;

        Ok(Self { env, properties })
    }

    /// Build a source from in-memory values; properties use dotted keys.
    pub fn from_parts<I, J, K, V, P, Q>(env: I, properties: J) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        J: IntoIterator<Item = (P, Q)>,
        K: Into<String>,
        V: Into<String>,
        P: AsRef<str>,
        Q: Into<String>,
    {
        let mut builder = config::Config::builder();
        for (key, value) in properties {
            builder = builder.set_override(key, value.into())?;
        }

        Ok(Self {
            env: env.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            properties: builder.build()?,
        })
    }

    /// Non-blank environment value.
    pub fn env_value(&self, name: &str) -> Option<String> {
        self.env
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Non-blank property value.
    pub fn property_value(&self, key: &str) -> Option<String> {
        self.properties
            .get_string(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Environment first, property as fallback.
    pub fn lookup(&self, key: &SettingKey) -> Option<String> {
        self.env_value(key.env)
            .or_else(|| self.property_value(key.property))
    }

    pub fn resolve(&self, key: &SettingKey) -> Result<String, ConfigError> {
        self.lookup(key).ok_or(ConfigError::Missing {
            name: key.name,
            env: key.env,
            property: key.property,
        })
    }

    fn resolve_topic(&self, key: &SettingKey) -> Result<Topic, ConfigError> {
        let value = self.resolve(key)?;
        Topic::new(value).map_err(|message| ConfigError::Invalid {
            key: key.env.to_string(),
            message: message.to_string(),
        })
    }
}

// ============================================================================
// Stage Configs
// ============================================================================

/// What the transform stage does with a row it cannot parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedRowPolicy {
    /// Any malformed row fails the whole invocation; nothing is published.
    #[default]
    FailBatch,
    /// Malformed rows are logged and dropped; the rest of the batch is published.
    SkipRow,
}

impl std::str::FromStr for MalformedRowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail-batch" | "fail_batch" | "fail" => Ok(MalformedRowPolicy::FailBatch),
            "skip-row" | "skip_row" | "skip" => Ok(MalformedRowPolicy::SkipRow),
            other => Err(format!(
                "unknown malformed row policy '{}', expected 'fail-batch' or 'skip-row'",
                other
            )),
        }
    }
}

impl MalformedRowPolicy {
    /// Configured policy, or fail-batch when unset.
    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        match source.lookup(&MALFORMED_ROW_POLICY) {
            Some(value) => value.parse().map_err(|message| ConfigError::Invalid {
                key: MALFORMED_ROW_POLICY.env.to_string(),
                message,
            }),
            None => Ok(MalformedRowPolicy::default()),
        }
    }
}

impl std::fmt::Display for MalformedRowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedRowPolicy::FailBatch => write!(f, "fail-batch"),
            MalformedRowPolicy::SkipRow => write!(f, "skip-row"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestStageConfig {
    pub output_topic: Topic,
}

impl IngestStageConfig {
    pub fn new(output_topic: Topic) -> Self {
        Self { output_topic }
    }

    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        let output_topic = source.resolve_topic(&INGEST_OUTPUT_TOPIC)?;
        info!(topic = %output_topic, "Configured ingest SNS topic");
        Ok(Self { output_topic })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformStageConfig {
    pub output_topic: Topic,
    pub malformed_rows: MalformedRowPolicy,
}

impl TransformStageConfig {
    pub fn new(output_topic: Topic, malformed_rows: MalformedRowPolicy) -> Self {
        Self {
            output_topic,
            malformed_rows,
        }
    }

    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        let output_topic = source.resolve_topic(&TRANSFORM_OUTPUT_TOPIC)?;
        let malformed_rows = MalformedRowPolicy::from_source(source)?;
        info!(topic = %output_topic, policy = %malformed_rows, "Configured transform SNS topic");
        Ok(Self {
            output_topic,
            malformed_rows,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistStageConfig {
    pub table: String,
}

impl PersistStageConfig {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        let table = source.resolve(&STORE_TABLE)?;
        info!(table = %table, "Resolved DynamoDB table name");
        Ok(Self { table })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutStageConfig {
    pub fanout_topic: Topic,
}

impl FanoutStageConfig {
    pub fn new(fanout_topic: Topic) -> Self {
        Self { fanout_topic }
    }

    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        let fanout_topic = source.resolve_topic(&FANOUT_TOPIC)?;
        info!(topic = %fanout_topic, "Configured fanout SNS topic");
        Ok(Self { fanout_topic })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    pub bucket: String,
}

impl UploadConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }

    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        Ok(Self {
            bucket: source.resolve(&UPLOAD_BUCKET)?,
        })
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay configuration.
//!
//! Supports both programmatic and file-based (TOML) configuration. Any of
//! the connection fields, and `measurement`, may contain placeholders, in
//! which case they are resolved per record.

use crate::placeholder::{local_hostname, Metadata, Template, DEFAULT_MAX_DEPTH};
use crate::precision::TimePrecision;
use crate::value::Value;
use chrono_tz::Tz;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid configuration: unknown time_precision '{0}' (expected h, m, s, ms, u or ns)")]
    UnknownPrecision(String),

    #[error("Invalid configuration: keep_keys requires renew_record = true")]
    KeepKeysWithoutRenew,
}

/// What to do when a flush group fails to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteErrorPolicy {
    /// Stop at the first failed group; later groups are not attempted.
    #[default]
    Abort,
    /// Attempt every group, then report the first failure.
    Continue,
}

/// Port setting: a number, or a template resolved per record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortSetting {
    Number(u16),
    Template(String),
}

impl Default for PortSetting {
    fn default() -> Self {
        Self::Number(default_port())
    }
}

impl fmt::Display for PortSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(port) => write!(f, "{}", port),
            Self::Template(template) => f.write_str(template),
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// InfluxDB host (may contain placeholders).
    #[serde(default = "default_host")]
    pub host: String,

    /// InfluxDB port (number or placeholder template).
    #[serde(default)]
    pub port: PortSetting,

    /// Database name (may contain placeholders).
    #[serde(default = "default_dbname")]
    pub dbname: String,

    /// User name (may contain placeholders).
    #[serde(default = "default_credential")]
    pub user: String,

    /// Password (may contain placeholders).
    #[serde(default = "default_credential")]
    pub password: String,

    /// Connect over TLS.
    #[serde(default)]
    pub use_ssl: bool,

    /// Record field holding the event's own timestamp.
    #[serde(default = "default_time_key")]
    pub time_key: String,

    /// Timestamp unit: h, m, s, ms, u or ns.
    #[serde(default = "default_time_precision")]
    pub time_precision: String,

    /// IANA zone for record date-times without an offset (UTC when unset).
    #[serde(default)]
    pub time_zone: Option<String>,

    /// Fields written as tags.
    #[serde(default)]
    pub tag_keys: Vec<String>,

    /// Write string fields as tags (ignored when `tag_keys` is set).
    #[serde(default)]
    pub auto_tags: bool,

    /// Tag holding the same-timestamp sequence number.
    #[serde(default)]
    pub sequence_tag: Option<String>,

    /// Fields removed before classification.
    #[serde(default)]
    pub remove_keys: Vec<String>,

    /// Only these fields survive (requires `renew_record`).
    #[serde(default)]
    pub keep_keys: Vec<String>,

    /// Rebuild the record from `keep_keys` instead of editing it in place.
    #[serde(default)]
    pub renew_record: bool,

    /// Record field naming the retention policy.
    #[serde(default)]
    pub retention_policy_key: Option<String>,

    /// Retention policy used when the record names none.
    #[serde(default)]
    pub default_retention_policy: Option<String>,

    /// Series name (may contain placeholders). Defaults to the event tag.
    #[serde(default)]
    pub measurement: Option<String>,

    /// Write integer values as floats.
    #[serde(default)]
    pub cast_number_to_float: bool,

    /// Drop records holding any empty-string value.
    #[serde(default)]
    pub reject_empty_values: bool,

    /// Keep a single-placeholder template's value type (e.g. integer port).
    #[serde(default = "default_true")]
    pub preserve_types: bool,

    /// Host name exposed to placeholders. Defaults to the local host name.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Maximum nesting depth flattened into placeholder lookups.
    #[serde(default = "default_placeholder_depth")]
    pub placeholder_depth: usize,

    /// Behaviour when a flush group fails to write.
    #[serde(default)]
    pub on_write_error: WriteErrorPolicy,

    /// Field renames applied before classification (`old = "new"`).
    #[serde(default)]
    pub rename_keys: IndexMap<String, String>,

    /// Static values exposed to placeholders.
    #[serde(default)]
    pub metadata: IndexMap<String, Value>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8086
}

fn default_dbname() -> String {
    "fluentd".to_string()
}

fn default_credential() -> String {
    "root".to_string()
}

fn default_time_key() -> String {
    "time".to_string()
}

fn default_time_precision() -> String {
    "s".to_string()
}

fn default_true() -> bool {
    true
}

fn default_placeholder_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: PortSetting::default(),
            dbname: default_dbname(),
            user: default_credential(),
            password: default_credential(),
            use_ssl: false,
            time_key: default_time_key(),
            time_precision: default_time_precision(),
            time_zone: None,
            tag_keys: Vec::new(),
            auto_tags: false,
            sequence_tag: None,
            remove_keys: Vec::new(),
            keep_keys: Vec::new(),
            renew_record: false,
            retention_policy_key: None,
            default_retention_policy: None,
            measurement: None,
            cast_number_to_float: false,
            reject_empty_values: false,
            preserve_types: true,
            hostname: None,
            placeholder_depth: DEFAULT_MAX_DEPTH,
            on_write_error: WriteErrorPolicy::Abort,
            rename_keys: IndexMap::new(),
            metadata: IndexMap::new(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration writing to `dbname` with every other setting at its default.
    pub fn new(dbname: impl Into<String>) -> Self {
        Self {
            dbname: dbname.into(),
            ..Default::default()
        }
    }

    /// A populated configuration, used by `gen-config`.
    pub fn example() -> Self {
        let mut metadata = IndexMap::new();
        metadata.insert("env".to_string(), Value::from("production"));

        let mut rename_keys = IndexMap::new();
        rename_keys.insert("msec".to_string(), "latency_ms".to_string());

        Self {
            dbname: "metrics_${tag_parts[0]}".into(),
            time_precision: "ms".into(),
            tag_keys: vec!["host".into(), "status".into()],
            sequence_tag: Some("_seq".into()),
            remove_keys: vec!["password".into()],
            retention_policy_key: Some("rp".into()),
            default_retention_policy: Some("autogen".into()),
            measurement: Some("${tag_parts[-1]}".into()),
            rename_keys,
            metadata,
            ..Default::default()
        }
    }

    /// Parsed timestamp unit.
    pub fn precision(&self) -> Result<TimePrecision, ConfigError> {
        self.time_precision.parse()
    }

    /// Parsed `time_zone`; a blank setting means UTC.
    pub fn time_zone(&self) -> Result<Option<Tz>, ConfigError> {
        match self.time_zone.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(name) => name
                .parse::<Tz>()
                .map(Some)
                .map_err(|_| ConfigError::Invalid(format!("unknown time_zone '{}'", name))),
        }
    }

    /// Host name exposed to placeholders.
    pub fn resolved_hostname(&self) -> String {
        self.hostname.clone().unwrap_or_else(local_hostname)
    }

    /// Static placeholder inputs derived from this configuration.
    pub fn placeholder_metadata(&self) -> Metadata {
        Metadata {
            hostname: self.resolved_hostname(),
            extra: self.metadata.clone(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.precision()?;
        self.time_zone()?;

        if !self.keep_keys.is_empty() && !self.renew_record {
            return Err(ConfigError::KeepKeysWithoutRenew);
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.dbname.trim().is_empty() {
            return Err(ConfigError::Invalid("dbname must not be empty".into()));
        }

        match &self.port {
            PortSetting::Number(0) => {
                return Err(ConfigError::Invalid("port must not be 0".into()));
            }
            PortSetting::Number(_) => {}
            PortSetting::Template(template) => {
                if Template::parse(template).is_static() {
                    match template.trim().parse::<u16>() {
                        Ok(port) if port != 0 => {}
                        _ => {
                            return Err(ConfigError::Invalid(format!(
                                "port '{}' is neither a valid port number nor a placeholder template",
                                template
                            )));
                        }
                    }
                }
            }
        }

        if self.time_key.is_empty() {
            return Err(ConfigError::Invalid("time_key must not be empty".into()));
        }

        if let Some(tag) = &self.sequence_tag {
            if tag.trim().is_empty() {
                return Err(ConfigError::Invalid("sequence_tag must not be empty".into()));
            }
        }

        if let Some(measurement) = &self.measurement {
            if measurement.trim().is_empty() {
                return Err(ConfigError::Invalid("measurement must not be empty".into()));
            }
        }

        for (from, to) in &self.rename_keys {
            if from.is_empty() || to.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "rename_keys entry '{}' -> '{}' has an empty name",
                    from, to
                )));
            }
        }

        if self.placeholder_depth == 0 {
            return Err(ConfigError::Invalid(
                "placeholder_depth must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Set the InfluxDB host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn with_port(mut self, port: PortSetting) -> Self {
        self.port = port;
        self
    }

    /// Set the timestamp unit.
    pub fn with_time_precision(mut self, precision: impl Into<String>) -> Self {
        self.time_precision = precision.into();
        self
    }

    /// Set the zone for offset-less record date-times.
    pub fn with_time_zone(mut self, zone: impl Into<String>) -> Self {
        self.time_zone = Some(zone.into());
        self
    }

    /// Set the tag keys.
    pub fn with_tag_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable automatic tagging of string fields.
    pub fn with_auto_tags(mut self, enabled: bool) -> Self {
        self.auto_tags = enabled;
        self
    }

    /// Set the sequence tag name.
    pub fn with_sequence_tag(mut self, tag: impl Into<String>) -> Self {
        self.sequence_tag = Some(tag.into());
        self
    }

    /// Set the record field naming the retention policy.
    pub fn with_retention_policy_key(mut self, key: impl Into<String>) -> Self {
        self.retention_policy_key = Some(key.into());
        self
    }

    /// Set the fallback retention policy.
    pub fn with_default_retention_policy(mut self, policy: impl Into<String>) -> Self {
        self.default_retention_policy = Some(policy.into());
        self
    }

    /// Set the series name (static or templated).
    pub fn with_measurement(mut self, measurement: impl Into<String>) -> Self {
        self.measurement = Some(measurement.into());
        self
    }

    /// Set the write failure policy.
    pub fn with_write_error_policy(mut self, policy: WriteErrorPolicy) -> Self {
        self.on_write_error = policy;
        self
    }
}

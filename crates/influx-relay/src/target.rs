// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection targets.
//!
//! A [`Target`] identifies one InfluxDB database on one server with one set
//! of credentials. When no connection field contains placeholders there is a
//! single target for the engine's lifetime; otherwise each record resolves its
//! own, and every distinct target gets its own lazily created client.

use crate::config::{ConfigError, PortSetting, RelayConfig};
use crate::placeholder::{PlaceholderContext, Template};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Per-record target resolution failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("resolved {0} is empty")]
    Empty(&'static str),

    #[error("resolved port '{0}' is not a valid port number")]
    Port(String),
}

/// A resolved connection descriptor.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub use_ssl: bool,
}

impl Target {
    /// Base URL of the server.
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Human-readable descriptor; never includes the password.
    pub fn descriptor(&self) -> String {
        format!("{}@{}/{}", self.user, self.url(), self.database)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("use_ssl", &self.use_ssl)
            .finish()
    }
}

#[derive(Debug, Clone)]
enum PortSource {
    Fixed(u16),
    Template(Template),
}

/// Resolves the connection target for each record.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    fixed: Option<Arc<Target>>,
    host: Template,
    port: PortSource,
    database: Template,
    user: Template,
    password: Template,
    use_ssl: bool,
    preserve_types: bool,
}

impl TargetResolver {
    /// Parse connection templates from configuration.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        let port = match &config.port {
            PortSetting::Number(port) => PortSource::Fixed(*port),
            PortSetting::Template(source) => {
                let template = Template::parse(source);
                if template.is_static() {
                    let port = source.trim().parse::<u16>().map_err(|_| {
                        ConfigError::Invalid(format!("port '{}' is not a valid port number", source))
                    })?;
                    PortSource::Fixed(port)
                } else {
                    PortSource::Template(template)
                }
            }
        };

        let mut resolver = Self {
            fixed: None,
            host: Template::parse(&config.host),
            port,
            database: Template::parse(&config.dbname),
            user: Template::parse(&config.user),
            password: Template::parse(&config.password),
            use_ssl: config.use_ssl,
            preserve_types: config.preserve_types,
        };

        if !resolver.is_dynamic() {
            let target = resolver
                .resolve_with(&PlaceholderContext::new())
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            resolver.fixed = Some(Arc::new(target));
        }
        Ok(resolver)
    }

    /// True when any connection field contains placeholders.
    pub fn is_dynamic(&self) -> bool {
        !(self.host.is_static()
            && matches!(self.port, PortSource::Fixed(_))
            && self.database.is_static()
            && self.user.is_static()
            && self.password.is_static())
    }

    /// The single target, when nothing is templated.
    pub fn fixed(&self) -> Option<&Arc<Target>> {
        self.fixed.as_ref()
    }

    /// Target for one record.
    pub fn resolve(&self, ctx: &PlaceholderContext) -> Result<Arc<Target>, TargetError> {
        match &self.fixed {
            Some(target) => Ok(Arc::clone(target)),
            None => self.resolve_with(ctx).map(Arc::new),
        }
    }

    fn resolve_with(&self, ctx: &PlaceholderContext) -> Result<Target, TargetError> {
        let host = self.host.render(ctx);
        if host.trim().is_empty() {
            return Err(TargetError::Empty("host"));
        }
        let database = self.database.render(ctx);
        if database.trim().is_empty() {
            return Err(TargetError::Empty("dbname"));
        }

        let port = match &self.port {
            PortSource::Fixed(port) => *port,
            PortSource::Template(template) => {
                let value = template.render_value(ctx, self.preserve_types);
                value
                    .as_i64()
                    .and_then(|p| u16::try_from(p).ok())
                    .filter(|p| *p != 0)
                    .ok_or_else(|| TargetError::Port(value.to_string()))?
            }
        };

        Ok(Target {
            host,
            port,
            database,
            user: self.user.render(ctx),
            password: self.password.render(ctx),
            use_ssl: self.use_ssl,
        })
    }
}

/// Lazily created, memoized per-target clients.
///
/// Entries live as long as the cache; there is no eviction.
#[derive(Debug)]
pub struct ClientCache<C> {
    clients: HashMap<Target, C>,
}

impl<C> Default for ClientCache<C> {
    fn default() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }
}

impl<C> ClientCache<C> {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Client for `target`, creating it with `create` on first use.
    ///
    /// A failed creation leaves no entry, so the next call retries.
    pub fn get_or_try_insert_with<E, F>(&mut self, target: &Target, create: F) -> Result<&mut C, E>
    where
        F: FnOnce() -> Result<C, E>,
    {
        match self.clients.entry(target.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let client = create()?;
                tracing::debug!(destination = %target, "created client");
                Ok(entry.insert(client))
            }
        }
    }

    /// True if a client exists for `target`.
    pub fn contains(&self, target: &Target) -> bool {
        self.clients.contains_key(target)
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// True when no client has been created yet.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Targets with a cached client.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.clients.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn ctx_with(entries: &[(&str, Value)]) -> PlaceholderContext {
        let mut ctx = PlaceholderContext::new();
        for (k, v) in entries {
            ctx.insert(*k, v.clone());
        }
        ctx
    }

    #[test]
    fn test_static_target_is_resolved_once() {
        let resolver = TargetResolver::from_config(&RelayConfig::new("metrics")).expect("resolver");
        assert!(!resolver.is_dynamic());

        let fixed = resolver.fixed().expect("fixed target");
        assert_eq!(fixed.host, "localhost");
        assert_eq!(fixed.port, 8086);
        assert_eq!(fixed.database, "metrics");

        let a = resolver.resolve(&PlaceholderContext::new()).unwrap();
        let b = resolver.resolve(&PlaceholderContext::new()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_dynamic_target_per_record() {
        let config = RelayConfig::new("db_${tag_parts[0]}")
            .with_host("${host}")
            .with_port(PortSetting::Template("${port}".into()));
        let resolver = TargetResolver::from_config(&config).expect("resolver");
        assert!(resolver.is_dynamic());
        assert!(resolver.fixed().is_none());

        let ctx = ctx_with(&[
            ("host", Value::from("influx-a")),
            ("port", Value::Integer(9086)),
            (
                "tag_parts",
                Value::Array(vec![Value::from("app"), Value::from("web")]),
            ),
        ]);
        let target = resolver.resolve(&ctx).expect("target");
        assert_eq!(target.host, "influx-a");
        assert_eq!(target.port, 9086);
        assert_eq!(target.database, "db_app");
    }

    #[test]
    fn test_port_from_string_value() {
        let config = RelayConfig::default().with_port(PortSetting::Template("${port}".into()));
        let resolver = TargetResolver::from_config(&config).expect("resolver");
        let target = resolver
            .resolve(&ctx_with(&[("port", Value::from("8087"))]))
            .expect("target");
        assert_eq!(target.port, 8087);
    }

    #[test]
    fn test_resolve_failures() {
        let config = RelayConfig::new("${db}").with_port(PortSetting::Template("${port}".into()));
        let resolver = TargetResolver::from_config(&config).expect("resolver");

        assert_eq!(
            resolver.resolve(&ctx_with(&[("port", Value::Integer(1))])),
            Err(TargetError::Empty("dbname"))
        );
        assert_eq!(
            resolver.resolve(&ctx_with(&[
                ("db", Value::from("x")),
                ("port", Value::Integer(70_000))
            ])),
            Err(TargetError::Port("70000".into()))
        );
    }

    #[test]
    fn test_descriptor_hides_password() {
        let mut config = RelayConfig::new("db");
        config.password = "s3cret".into();
        config.use_ssl = true;
        let resolver = TargetResolver::from_config(&config).expect("resolver");
        let target = resolver.fixed().expect("fixed");
        assert_eq!(target.descriptor(), "root@https://localhost:8086/db");
        assert!(!format!("{:?}", target).contains("s3cret"));
    }

    #[test]
    fn test_client_cache_memoizes() {
        let mut cache: ClientCache<u32> = ClientCache::new();
        let resolver = TargetResolver::from_config(&RelayConfig::new("a")).expect("resolver");
        let target = resolver.fixed().expect("fixed").as_ref().clone();

        let mut created = 0;
        for _ in 0..3 {
            let client = cache
                .get_or_try_insert_with::<(), _>(&target, || {
                    created += 1;
                    Ok(7)
                })
                .expect("client");
            *client += 1;
        }
        assert_eq!(created, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&target));
    }

    #[test]
    fn test_client_cache_failed_creation_retries() {
        let mut cache: ClientCache<u32> = ClientCache::new();
        let target = TargetResolver::from_config(&RelayConfig::new("a"))
            .expect("resolver")
            .fixed()
            .expect("fixed")
            .as_ref()
            .clone();

        assert!(cache
            .get_or_try_insert_with(&target, || Err::<u32, _>("down"))
            .is_err());
        assert!(cache.is_empty());
        assert!(cache
            .get_or_try_insert_with::<&str, _>(&target, || Ok(1))
            .is_ok());
        assert_eq!(cache.len(), 1);
    }
}

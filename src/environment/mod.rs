//! # App Engine Environment
//!
//! Classifies the current execution context (production or development,
//! task or cron invocation, queue, retry count, identifiers) from App Engine
//! environment markers, and locates the application root.
//!
//! Lookups go through the [`Environment`] trait instead of reading process
//! variables directly, so callers can classify a request from its headers
//! and tests can use a plain map.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::HeaderMap;

pub mod context;
pub mod guard;
pub mod root;

pub use context::{
    ExecutionContext, application_id, default_gcs_bucket_name, environment_report, gae_version,
    is_development_environment, is_in_cron, is_in_task, is_production_environment, project_id,
    task_name, task_queue_name, task_retry_count,
};
pub use guard::{guard, task_only};
pub use root::{APP_YAML, get_application_root, locate_application_root};

/// `<project>~<app>`-style application identifier.
pub const GAE_APPLICATION: &str = "GAE_APPLICATION";
/// Runtime tier; `standard` on App Engine standard.
pub const GAE_ENV: &str = "GAE_ENV";
/// Deployed version identifier.
pub const GAE_VERSION: &str = "GAE_VERSION";
/// Cloud project identifier.
pub const GOOGLE_CLOUD_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
pub const TASK_NAME: &str = "HTTP_X_APPENGINE_TASKNAME";
pub const TASK_QUEUE_NAME: &str = "HTTP_X_APPENGINE_QUEUENAME";
pub const TASK_RETRY_COUNT: &str = "HTTP_X_APPENGINE_TASKRETRYCOUNT";
pub const CRON: &str = "HTTP_X_APPENGINE_CRON";
/// Directory checked for `app.yaml` before walking up from the executable.
pub const APP_YAML_LOCATION: &str = "GAEKIT_APP_YAML_LOCATION";

/// Read-only view of named environment values.
pub trait Environment: Send + Sync {
    /// Returns the value of `name`, if set.
    fn get(&self, name: &str) -> Option<String>;
}

/// Shared handle to an environment provider.
pub type SharedEnvironment = Arc<dyn Environment>;

impl<E: Environment + ?Sized> Environment for Arc<E> {
    fn get(&self, name: &str) -> Option<String> {
        (**self).get(name)
    }
}

impl<E: Environment + ?Sized> Environment for &E {
    fn get(&self, name: &str) -> Option<String> {
        (**self).get(name)
    }
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// An owned snapshot of environment values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapEnvironment {
    values: BTreeMap<String, String>,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }
}

impl Environment for MapEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnvironment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Environment of a single request.
///
/// On App Engine standard, `HTTP_*` names resolve against the request
/// headers the way CGI maps them (`HTTP_X_APPENGINE_TASKNAME` reads
/// `X-AppEngine-TaskName`), then fall back to `fallback`. Only App Engine
/// standard strips `X-AppEngine-*` headers from external traffic; anywhere
/// else the headers are ignored and only `fallback` is consulted.
pub struct RequestEnvironment<'a> {
    headers: &'a HeaderMap,
    fallback: &'a dyn Environment,
    trust_headers: bool,
}

impl<'a> RequestEnvironment<'a> {
    pub fn new(headers: &'a HeaderMap, fallback: &'a dyn Environment) -> Self {
        Self {
            headers,
            fallback,
            trust_headers: is_production_environment(fallback),
        }
    }
}

impl Environment for RequestEnvironment<'_> {
    fn get(&self, name: &str) -> Option<String> {
        if self.trust_headers
            && let Some(header) = name.strip_prefix("HTTP_")
        {
            let header = header.to_ascii_lowercase().replace('_', "-");
            if let Some(value) = self.headers.get(header.as_str())
                && let Ok(value) = value.to_str()
            {
                return Some(value.to_string());
            }
        }
        self.fallback.get(name)
    }
}

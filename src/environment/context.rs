//! Execution-context queries over an [`Environment`].
//!
//! Every function recomputes from the environment on each call.

use std::path::Path;

use serde::Serialize;
use serde_json::{Value, json};
use utoipa::ToSchema;

use super::{
    CRON, Environment, GAE_APPLICATION, GAE_ENV, GAE_VERSION, GOOGLE_CLOUD_PROJECT, TASK_NAME,
    TASK_QUEUE_NAME, TASK_RETRY_COUNT,
};

const DEFAULT_APPLICATION: &str = "e~example";
const DEFAULT_PROJECT: &str = "example";
const DEFAULT_QUEUE: &str = "default";

/// Application identifier with the partition prefix (`e~`, `s~`) removed.
pub fn application_id<E: Environment + ?Sized>(env: &E) -> String {
    let raw = env
        .get(GAE_APPLICATION)
        .unwrap_or_else(|| DEFAULT_APPLICATION.to_string());
    match raw.split_once('~') {
        Some((_, app)) => app.to_string(),
        None => raw,
    }
}

/// Cloud project identifier, `example` outside App Engine.
pub fn project_id<E: Environment + ?Sized>(env: &E) -> String {
    env.get(GOOGLE_CLOUD_PROJECT)
        .unwrap_or_else(|| DEFAULT_PROJECT.to_string())
}

pub fn gae_version<E: Environment + ?Sized>(env: &E) -> Option<String> {
    env.get(GAE_VERSION)
}

/// The default Cloud Storage bucket, `<application_id>.appspot.com`.
pub fn default_gcs_bucket_name<E: Environment + ?Sized>(env: &E) -> String {
    format!("{}.appspot.com", application_id(env))
}

/// True unless `GAE_ENV` declares the standard (production) environment.
pub fn is_development_environment<E: Environment + ?Sized>(env: &E) -> bool {
    env.get(GAE_ENV).as_deref() != Some("standard")
}

pub fn is_production_environment<E: Environment + ?Sized>(env: &E) -> bool {
    !is_development_environment(env)
}

/// Name of the running task, if this is a task.
pub fn task_name<E: Environment + ?Sized>(env: &E) -> Option<String> {
    env.get(TASK_NAME)
}

pub fn is_in_task<E: Environment + ?Sized>(env: &E) -> bool {
    task_name(env).is_some_and(|name| !name.is_empty())
}

pub fn is_in_cron<E: Environment + ?Sized>(env: &E) -> bool {
    env.get(CRON).is_some_and(|flag| !flag.is_empty())
}

/// Queue of the running task; `None` outside a task even when a queue
/// marker is present.
pub fn task_queue_name<E: Environment + ?Sized>(env: &E) -> Option<String> {
    if !is_in_task(env) {
        return None;
    }
    Some(
        env.get(TASK_QUEUE_NAME)
            .unwrap_or_else(|| DEFAULT_QUEUE.to_string()),
    )
}

/// Retry count of the running task; `None` when missing or not a number.
pub fn task_retry_count<E: Environment + ?Sized>(env: &E) -> Option<i64> {
    env.get(TASK_RETRY_COUNT)?.trim().parse().ok()
}

/// Serializable snapshot of every classifier answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ExecutionContext {
    pub application_id: String,
    pub project_id: String,
    pub gae_version: Option<String>,
    pub is_production: bool,
    pub is_task: bool,
    pub is_cron: bool,
    pub task_name: Option<String>,
    pub queue_name: Option<String>,
    pub retry_count: Option<i64>,
}

impl ExecutionContext {
    pub fn capture<E: Environment + ?Sized>(env: &E) -> Self {
        Self {
            application_id: application_id(env),
            project_id: project_id(env),
            gae_version: gae_version(env),
            is_production: is_production_environment(env),
            is_task: is_in_task(env),
            is_cron: is_in_cron(env),
            task_name: task_name(env),
            queue_name: task_queue_name(env),
            retry_count: task_retry_count(env),
        }
    }
}

/// Report printed by `gaekit env`: the context plus the application root and
/// default bucket. Non-UTF-8 path segments are rendered lossily.
pub fn environment_report<E: Environment + ?Sized>(env: &E, application_root: &Path) -> Value {
    json!({
        "context": ExecutionContext::capture(env),
        "application_root": application_root.display().to_string(),
        "default_gcs_bucket": default_gcs_bucket_name(env),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::MapEnvironment;

    #[test]
    fn test_environment_report() {
        let env = MapEnvironment::new().with(GAE_APPLICATION, "e~demo");
        let report = environment_report(&env, Path::new("/srv/app"));

        assert_eq!(report["application_root"], "/srv/app");
        assert_eq!(report["default_gcs_bucket"], "demo.appspot.com");
        assert_eq!(report["context"]["application_id"], "demo");
    }

    #[cfg(unix)]
    #[test]
    fn test_environment_report_with_non_utf8_root() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = Path::new(OsStr::from_bytes(b"/srv/app-\xff"));
        let report = environment_report(&MapEnvironment::new(), root);

        let rendered = report["application_root"].as_str().unwrap();
        assert!(rendered.starts_with("/srv/app-"));
    }

    #[test]
    fn test_empty_environment_is_development_without_queue() {
        let env = MapEnvironment::new();

        assert!(is_development_environment(&env));
        assert!(!is_production_environment(&env));
        assert!(!is_in_task(&env));
        assert!(!is_in_cron(&env));
        assert_eq!(task_queue_name(&env), None);
        assert_eq!(task_retry_count(&env), None);
    }

    #[test]
    fn test_production_and_development_are_complements() {
        for value in [None, Some("standard"), Some("flex"), Some(""), Some("Standard")] {
            let mut env = MapEnvironment::new();
            if let Some(value) = value {
                env.set(GAE_ENV, value);
            }
            assert_ne!(
                is_production_environment(&env),
                is_development_environment(&env),
                "GAE_ENV={:?}",
                value
            );
        }

        let env = MapEnvironment::new().with(GAE_ENV, "standard");
        assert!(is_production_environment(&env));
    }

    #[test]
    fn test_task_queue_name_requires_task() {
        let mut env = MapEnvironment::new().with(TASK_QUEUE_NAME, "demo123");
        assert_eq!(task_queue_name(&env), None);

        env.remove(TASK_QUEUE_NAME);
        env.set(TASK_NAME, "task-1");
        assert_eq!(task_queue_name(&env).as_deref(), Some("default"));

        env.set(TASK_QUEUE_NAME, "demo123");
        assert_eq!(task_queue_name(&env).as_deref(), Some("demo123"));

        env.remove(TASK_QUEUE_NAME);
        assert_eq!(task_queue_name(&env).as_deref(), Some("default"));
    }

    #[test]
    fn test_empty_task_name_is_not_a_task() {
        let env = MapEnvironment::new()
            .with(TASK_NAME, "")
            .with(TASK_QUEUE_NAME, "demo123");

        assert!(!is_in_task(&env));
        assert_eq!(task_name(&env).as_deref(), Some(""));
        assert_eq!(task_queue_name(&env), None);
    }

    #[test]
    fn test_cron_marker() {
        assert!(is_in_cron(&MapEnvironment::new().with(CRON, "1")));
        assert!(!is_in_cron(&MapEnvironment::new().with(CRON, "")));
    }

    #[test]
    fn test_task_retry_count_parsing() {
        let count = |value: &str| task_retry_count(&MapEnvironment::new().with(TASK_RETRY_COUNT, value));

        assert_eq!(count("3"), Some(3));
        assert_eq!(count(" 7 "), Some(7));
        assert_eq!(count("0"), Some(0));
        assert_eq!(count("three"), None);
        assert_eq!(count(""), None);
    }

    #[test]
    fn test_application_id_strips_partition() {
        assert_eq!(application_id(&MapEnvironment::new()), "example");
        assert_eq!(
            application_id(&MapEnvironment::new().with(GAE_APPLICATION, "s~my-app")),
            "my-app"
        );
        assert_eq!(
            application_id(&MapEnvironment::new().with(GAE_APPLICATION, "plain-app")),
            "plain-app"
        );
        assert_eq!(
            default_gcs_bucket_name(&MapEnvironment::new().with(GAE_APPLICATION, "e~shop")),
            "shop.appspot.com"
        );
    }

    #[test]
    fn test_project_id_and_version() {
        let env = MapEnvironment::new();
        assert_eq!(project_id(&env), "example");
        assert_eq!(gae_version(&env), None);

        let env = env
            .with(GOOGLE_CLOUD_PROJECT, "acme-prod")
            .with(GAE_VERSION, "20241017t1200");
        assert_eq!(project_id(&env), "acme-prod");
        assert_eq!(gae_version(&env).as_deref(), Some("20241017t1200"));
    }

    #[test]
    fn test_execution_context_capture() {
        let env = MapEnvironment::new()
            .with(GAE_ENV, "standard")
            .with(TASK_NAME, "t-42")
            .with(TASK_RETRY_COUNT, "2");

        let context = ExecutionContext::capture(&env);
        assert!(context.is_production);
        assert!(context.is_task);
        assert!(!context.is_cron);
        assert_eq!(context.queue_name.as_deref(), Some("default"));
        assert_eq!(context.retry_count, Some(2));

        let json = serde_json::to_value(&context).unwrap();
        assert_eq!(json["task_name"], "t-42");
        assert_eq!(json["application_id"], "example");
    }
}

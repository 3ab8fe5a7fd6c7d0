//! Access guard for task and cron endpoints.

use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
};

use super::{RequestEnvironment, SharedEnvironment, is_in_cron, is_in_task};
use crate::error::{ApiError, forbidden};

/// Middleware rejecting requests that are neither a task nor a cron invocation.
///
/// On App Engine standard, markers are read from the request headers first,
/// then from `env`. Elsewhere only `env` counts.
pub async fn task_only(
    State(env): State<SharedEnvironment>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let allowed = {
        let request_env = RequestEnvironment::new(request.headers(), env.as_ref());
        is_in_task(&request_env) || is_in_cron(&request_env)
    };

    if !allowed {
        tracing::warn!(
            path = %request.uri().path(),
            "Rejected non-task request to task-only endpoint"
        );
        return Err(forbidden(None));
    }

    Ok(next.run(request).await)
}

/// Wraps every route of `router` in [`task_only`].
pub fn guard<S>(env: SharedEnvironment, router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(env, task_only))
}

//! Approvals - employee requests and approval workflows over a declarative
//! relational schema.

pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod helpers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod registry;
pub mod schema;
pub mod store;
pub mod telemetry;

use axum::{
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::time::Duration;

use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use credentials::PasswordPolicy;
use error::ApiError;
use handlers::{accounts, departments, employees, health, refresh_tokens, requests, workflows};
use middleware::{
    metrics_middleware, rate_limit_middleware, request_id_middleware, RateLimitConfig,
    RateLimitState,
};
use store::{RetryPolicy, Store};
use telemetry::MetricsState;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub rate_limit: RateLimitState,
    pub retry: RetryPolicy,
    pub password_policy: PasswordPolicy,
    pub password_hash_cost: u32,
    pub refresh_token_ttl: chrono::Duration,
    pub metrics: MetricsState,
}

impl AppState {
    pub fn new(store: Store, config: &Config) -> Self {
        let rate_limit = if config.security.rate_limiting_enabled {
            RateLimitState::new(RateLimitConfig::new(
                config.security.rate_limit_requests_per_minute,
                60,
            ))
        } else {
            RateLimitState::disabled()
        };

        let password_policy = if config.security.require_password_complexity {
            PasswordPolicy::complex(config.security.min_password_length)
        } else {
            PasswordPolicy::new(config.security.min_password_length)
        };

        Self {
            store,
            rate_limit,
            retry: config.retry.policy(),
            password_policy,
            password_hash_cost: config.security.password_hash_cost,
            refresh_token_ttl: chrono::Duration::days(config.security.refresh_token_ttl_days),
            metrics: MetricsState::new(config.telemetry.metrics_enabled),
        }
    }
}

pub fn create_router(state: AppState, config: &config::Config) -> Router {
    let cors = build_cors_layer(config);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let rate_limit_state = state.rate_limit.clone();
    let metrics_state = state.metrics.clone();

    let health_routes = Router::new()
        .route("/health", get(health::health_check_simple))
        .route("/health/status", get(health::health_check))
        .route("/health/ready", get(health::ready_check))
        .route("/health/live", get(health::live_check))
        .route(
            "/metrics",
            get(telemetry::metrics::metrics_handler).with_state(metrics_state),
        )
        .with_state(state.clone());

    let account_routes = Router::new()
        .route(
            "/accounts",
            post(accounts::create_account).get(accounts::list_accounts),
        )
        .route(
            "/accounts/{id}",
            get(accounts::get_account)
                .put(accounts::update_account)
                .delete(accounts::delete_account),
        )
        .route("/accounts/{id}/employee", get(accounts::get_account_employee))
        .route(
            "/accounts/{id}/approved-requests",
            get(accounts::list_approved_requests),
        )
        .route(
            "/accounts/{id}/refresh-tokens",
            get(accounts::list_account_refresh_tokens).post(accounts::issue_refresh_token),
        )
        .route("/refresh-tokens", get(refresh_tokens::list_refresh_tokens))
        .route(
            "/refresh-tokens/{id}",
            get(refresh_tokens::get_refresh_token).delete(refresh_tokens::delete_refresh_token),
        )
        .route(
            "/refresh-tokens/{id}/revoke",
            post(refresh_tokens::revoke_refresh_token),
        )
        .with_state(state.clone());

    let organisation_routes = Router::new()
        .route(
            "/departments",
            post(departments::create_department).get(departments::list_departments),
        )
        .route(
            "/departments/{id}",
            get(departments::get_department)
                .put(departments::update_department)
                .delete(departments::delete_department),
        )
        .route(
            "/departments/{id}/employees",
            get(departments::list_department_employees),
        )
        .route(
            "/employees",
            post(employees::create_employee).get(employees::list_employees),
        )
        .route(
            "/employees/{id}",
            get(employees::get_employee)
                .put(employees::update_employee)
                .delete(employees::delete_employee),
        )
        .route("/employees/{id}/transfer", post(employees::transfer_employee))
        .route("/employees/{id}/account", get(employees::get_employee_account))
        .route(
            "/employees/{id}/department",
            get(employees::get_employee_department),
        )
        .route(
            "/employees/{id}/requests",
            get(employees::list_employee_requests),
        )
        .route(
            "/employees/{id}/workflows",
            get(employees::list_employee_workflows),
        )
        .with_state(state.clone());

    let request_routes = Router::new()
        .route(
            "/requests",
            post(requests::create_request).get(requests::list_requests),
        )
        .route(
            "/requests/{id}",
            get(requests::get_request)
                .put(requests::update_request)
                .delete(requests::delete_request),
        )
        .route("/requests/{id}/approver", get(requests::get_request_approver))
        .route("/requests/{id}/employee", get(requests::get_request_employee))
        .route(
            "/requests/{id}/items",
            get(requests::list_request_items).post(requests::add_request_item),
        )
        .route(
            "/requests/{id}/items/{item_id}",
            axum::routing::put(requests::update_request_item)
                .delete(requests::remove_request_item),
        )
        .route(
            "/workflows",
            post(workflows::create_workflow).get(workflows::list_workflows),
        )
        .route(
            "/workflows/{id}",
            get(workflows::get_workflow)
                .put(workflows::update_workflow)
                .delete(workflows::delete_workflow),
        )
        .with_state(state);

    let docs_routes = openapi::swagger_router();

    Router::new()
        .merge(docs_routes)
        .merge(health_routes)
        .merge(account_routes)
        .merge(organisation_routes)
        .merge(request_routes)
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(rate_limit_middleware))
        .layer(axum::Extension(rate_limit_state))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> impl IntoResponse {
    ApiError::not_found("Not found", "NOT_FOUND")
}

fn build_cors_layer(config: &config::Config) -> CorsLayer {
    use axum::http::header::HeaderName;
    use axum::http::Method;

    let is_wildcard_origin = config.cors.allowed_origins.iter().any(|o| o == "*")
        || config.cors.allowed_origins.is_empty();

    let methods: Vec<Method> = config
        .cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    let headers: Vec<HeaderName> = config
        .cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let cors = match (is_wildcard_origin, config.cors.allow_credentials) {
        // Credentials forbid a literal `*`, so the request origin is echoed.
        (true, true) => CorsLayer::new().allow_origin(tower_http::cors::AllowOrigin::mirror_request()),
        (true, false) => CorsLayer::new().allow_origin(Any),
        (false, _) => {
            let origins: Vec<_> = config
                .cors
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new().allow_origin(origins)
        }
    };

    cors.allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(config.cors.allow_credentials)
        .max_age(Duration::from_secs(config.cors.max_age_secs))
}

pub use config::Config;
pub use telemetry::tracing::{init_telemetry, shutdown_telemetry};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_build_cors_layer_wildcard() {
        let mut config = Config::default_for_testing();
        config.cors.allowed_origins = vec!["*".to_string()];
        let _ = build_cors_layer(&config);
    }

    #[test]
    fn test_build_cors_layer_specific_origins() {
        let mut config = Config::default_for_testing();
        config.cors.allowed_origins = vec![
            "http://localhost:4200".to_string(),
            "https://example.com".to_string(),
        ];
        config.cors.allow_credentials = false;
        let _ = build_cors_layer(&config);
    }
}

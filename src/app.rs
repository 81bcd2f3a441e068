use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::access::{AccessEvaluator, AccessGuard, RuleStore, SqliteRuleSource};
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::routes::{access_rules, auth, documents, health, roles};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub config: Arc<AppConfig>,
    pub rules: Arc<RuleStore>,
    pub guard: AccessGuard,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, config: AppConfig) -> Self {
        let source = Arc::new(SqliteRuleSource::new(pool.clone()));
        let rules = Arc::new(RuleStore::new(source, config.cache_policy));
        let guard = AccessGuard::new(config.access_rules, AccessEvaluator::new(Arc::clone(&rules)));

        Self {
            pool,
            jwt: Arc::new(jwt),
            config: Arc::new(config),
            rules,
            guard,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let config = AppConfig::from_env()?;
    create_app_with(pool, jwt_config, config)
}

/// Builds the router for an explicit configuration. Feature flags decide
/// which route groups are mounted.
pub fn create_app_with(pool: SqlitePool, jwt: JwtConfig, config: AppConfig) -> Result<Router, AppError> {
    config.validate()?;

    tracing::info!(
        account_on = config.account_on,
        access_rules = %config.access_rules,
        cache_policy = %config.cache_policy,
        "building application"
    );

    let account_on = config.account_on;
    let state = AppState::new(pool, jwt, config);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let document_routes = Router::new()
        .route("/", get(documents::list_documents).post(documents::create_document))
        .route(
            "/:id",
            get(documents::get_document)
                .put(documents::update_document)
                .delete(documents::delete_document),
        );

    let mut router = Router::new()
        .route("/api/health", get(health::health))
        .nest("/documents", document_routes);

    if account_on {
        let auth_routes = Router::new()
            .route("/register", post(auth::register))
            .route("/login", post(auth::login))
            .route("/me", get(auth::me))
            .route("/logout", post(auth::logout));

        let rule_routes = Router::new()
            .route("/", get(access_rules::list_rules).post(access_rules::create_rule))
            .route(
                "/:id",
                get(access_rules::get_rule)
                    .put(access_rules::update_rule)
                    .delete(access_rules::delete_rule),
            );

        router = router
            .nest("/auth", auth_routes)
            .nest("/access-rules", rule_routes)
            .route("/roles", get(roles::list_roles).post(roles::create_role))
            .route("/identities/:identity_id/roles", post(roles::assign_role))
            .route("/identities/:identity_id/roles/:role_id", delete(roles::revoke_role));
    }

    Ok(router
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

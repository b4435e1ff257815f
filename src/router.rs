use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        // Package routes
        .route("/generate_bootstrap_package", post(handlers::bootstrap::generate_bootstrap_package))
        .route("/bootstrap_openstack", post(handlers::bootstrap::bootstrap_openstack))
        .route("/bootstrap_kvm", post(handlers::bootstrap::bootstrap_kvm))
        .route("/bootstrap_tgz", post(handlers::bootstrap::bootstrap_tgz))
        .route("/bootstrap_aws", post(handlers::bootstrap::bootstrap_aws))
        .route("/bootstrap_azure", post(handlers::bootstrap::bootstrap_azure))
        .route("/bootstrap_gcp", post(handlers::bootstrap::bootstrap_gcp))
        // Artifact cache routes
        .route("/get/:key", get(handlers::cache::get_artifact))
        .route("/set", post(handlers::cache::set_artifact))
        // Template routes
        .route("/list_templates", get(handlers::templates::list_templates))
        .route("/list_init_cfg_templates", get(handlers::templates::list_init_cfg_templates))
        .route("/get_template", post(handlers::templates::get_template))
        .route("/import_template", post(handlers::templates::import_template))
        .route("/update_template", post(handlers::templates::update_template))
        .route("/delete_template", post(handlers::templates::delete_template))
        .route("/render_template", post(handlers::templates::render_template))
        .route("/get_bootstrap_variables", post(handlers::templates::get_bootstrap_variables))
        .route("/get_template_variables", post(handlers::templates::get_template_variables))
        // Health
        .route("/healthcheck", get(handlers::healthcheck))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

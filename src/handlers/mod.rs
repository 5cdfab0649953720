mod contact;
mod health;
mod metrics;

pub use contact::contact_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;

use crate::rate_limit::admission_layer;
use crate::state::AppState;

// Only the contact route goes through the admission guard
pub fn router(state: Arc<AppState>) -> Router {
    let contact = Router::new()
        .route("/api/contact", post(contact_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            admission_layer,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(contact)
        .with_state(state)
}

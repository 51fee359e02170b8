//! Admin API.
//!
//! # Data Flow
//! ```text
//! GET /admin/status            → version + tracking status per group
//! GET /endpoints               → every group's snapshot (peek)
//! GET /endpoints/{key}         → one group's snapshot (peek)
//! GET /endpoints/{key}/current → consumer access (starts tracking)
//! ```
//!
//! # Design Decisions
//! - Every route requires `Authorization: Bearer <api_key>`
//! - Only `/current` counts as use; the rest never keep a tracker alive

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::health::CheckStats;
use crate::tracker::TrackerRegistry;

/// State shared by admin handlers.
pub struct AdminState<S> {
    pub registry: Arc<TrackerRegistry<S>>,
}

impl<S> Clone for AdminState<S> {
    fn clone(&self) -> Self {
        Self { registry: self.registry.clone() }
    }
}

pub fn setup_admin_router<S: CheckStats>(registry: Arc<TrackerRegistry<S>>, api_key: &str) -> Router {
    let api_key: Arc<str> = Arc::from(api_key);

    Router::new()
        .route("/admin/status", get(get_status::<S>))
        .route("/endpoints", get(list_endpoints::<S>))
        .route("/endpoints/{key}", get(get_endpoints::<S>))
        .route("/endpoints/{key}/current", get(get_current::<S>))
        .layer(middleware::from_fn_with_state(api_key, admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(AdminState { registry })
}

/// Serve the admin API on `listener` until `shutdown` resolves.
pub async fn serve_admin<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<(), std::io::Error>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}

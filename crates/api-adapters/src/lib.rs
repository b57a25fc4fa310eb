//! # api-adapters
//!
//! HTTP surface of the tip line (feature `web-axum`).

pub mod metrics;

#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod handlers;
#[cfg(feature = "web-axum")]
pub mod middleware;

pub use metrics::Metrics;

#[cfg(feature = "web-axum")]
pub use middleware::ProxyPolicy;
#[cfg(feature = "web-axum")]
pub use router::{router, AppState};

#[cfg(feature = "web-axum")]
mod router {
    use axum::{
        extract::FromRef,
        routing::{delete, get, post},
        Router,
    };
    use domains::ports::Clock;
    use services::{AdminService, BanManager, TipService};
    use std::sync::Arc;
    use tower_http::trace::TraceLayer;

    use crate::handlers;
    use crate::metrics::Metrics;
    use crate::middleware::{cors_policy, security_headers, ProxyPolicy};

    /// State shared by every handler.
    #[derive(Clone)]
    pub struct AppState {
        pub tips: Arc<TipService>,
        pub admin: Arc<AdminService>,
        pub bans: BanManager,
        pub metrics: Arc<Metrics>,
        pub clock: Arc<dyn Clock>,
        pub proxy: ProxyPolicy,
    }

    impl FromRef<AppState> for ProxyPolicy {
        fn from_ref(state: &AppState) -> Self {
            state.proxy
        }
    }

    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/api/tips", post(handlers::submit_tip).get(handlers::list_tips))
            .route("/api/tips/{id}", get(handlers::get_tip))
            .route(
                "/api/admin/tips/{id}/submitter",
                get(handlers::reveal_submitter),
            )
            .route("/api/admin/tips/pending", post(handlers::take_pending))
            .route("/api/admin/context", get(handlers::last_interaction))
            .route(
                "/api/admin/bans",
                post(handlers::create_ban).get(handlers::list_bans),
            )
            .route("/api/admin/bans/{identifier}", delete(handlers::lift_ban))
            .route("/health", get(handlers::health))
            .route("/metrics", get(handlers::metrics))
            .layer(axum::middleware::from_fn(security_headers))
            .layer(cors_policy())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

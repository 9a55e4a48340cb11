//! CarePoint Server - clinic practice-management platform API
//!
//! HTTP surface over the billing ledger core: bills, invoices, payments,
//! voiding, and aging reports. Authentication/authorization middleware and
//! the clinical modules live in their own services; this server owns the
//! ledger routes only.

pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use error::*;
pub use server::{CarePointServer, ServerConfig};

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the main application router with all routes and middleware
pub fn create_app(server: CarePointServer) -> Router {
    let router = openapi::with_docs(routes::create_routes());

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(server)
}

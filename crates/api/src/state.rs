use std::sync::Arc;

use crate::config::ServerConfig;
use crate::service::AnnotationService;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Store, mirror cache, catalog and assignments behind one facade.
    pub service: Arc<AnnotationService>,
    /// Name of the sheet backend in use, reported by `/health`.
    pub mirror_backend: &'static str,
}

pub mod steam;
pub mod upload;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Build all routes exposed by the import core (spec §6.1).
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new().merge(steam::routes()).merge(upload::routes())
}

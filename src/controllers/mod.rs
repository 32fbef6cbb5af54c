pub mod admin;
pub mod live;
pub mod seating;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(seating::routes())
        .nest("/admin", admin::routes())
}

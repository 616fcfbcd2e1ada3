pub mod bookings;
pub mod excursions;
pub mod slots;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(excursions::routes())
        .merge(slots::routes())
        .merge(bookings::routes())
}

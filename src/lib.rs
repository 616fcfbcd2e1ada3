pub mod config;
pub mod controllers;
pub mod database;
pub mod models;
pub mod services;
pub mod store;

use std::sync::Arc;

use services::{LifecycleService, ReminderService, ReservationService};
use store::{BookingStore, PgStore};

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub config: config::Config,
    pub store: Arc<dyn BookingStore>,
    pub reservations: ReservationService,
    pub lifecycle: LifecycleService,
    pub reminders: ReminderService,
}

impl AppState {
    pub async fn new(config: config::Config) -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let db = database::Database::new(&config.database.url, config.database.pool_size).await?;

        db.run_migrations().await?;

        let store: Arc<dyn BookingStore> = Arc::new(PgStore::new(
            db.pool.clone(),
            config.reservation.lock_wait_ms,
        ));
        let reservations = ReservationService::new(store.clone(), config.reservation.max_retries);
        let lifecycle = LifecycleService::new(store.clone());
        let reminders = ReminderService::new(store.clone());

        Ok(Arc::new(Self {
            db,
            config,
            store,
            reservations,
            lifecycle,
            reminders,
        }))
    }
}

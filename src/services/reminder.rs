//! reminder.rs
//!
//! Отбор броней для напоминаний. Только чтение зафиксированного состояния,
//! без блокировок - можно гонять с любой периодичностью. Сама доставка
//! уведомлений (push/SMS/бот) - забота внешнего сервиса; здесь каждая
//! подошедшая бронь отдаётся наружу и логируется структурной записью.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::store::{BookingStore, ReminderEntry, StoreError};

#[derive(Clone)]
pub struct ReminderService {
    store: Arc<dyn BookingStore>,
}

impl ReminderService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Активные оплаченные брони, чей слот стартует в пределах
    /// `window_hours` от текущего момента (уже начавшиеся не попадают).
    /// Порядок стабильный: (start_time, booking_id).
    pub async fn upcoming_for_reminder(
        &self,
        window_hours: i64,
    ) -> Result<Vec<ReminderEntry>, StoreError> {
        let now = Utc::now().naive_utc();
        self.store.upcoming_for_reminder(now, window_hours).await
    }

    /// Один проход фоновой задачи: выбрать и отдать в лог всё, что попало
    /// в окно. Ошибка выборки не валит цикл.
    pub async fn emit_due_reminders(&self, window_hours: i64) {
        match self.upcoming_for_reminder(window_hours).await {
            Ok(entries) => {
                for entry in &entries {
                    info!(
                        booking_id = entry.booking_id,
                        holder_id = entry.holder_id,
                        excursion = %entry.excursion_name,
                        start_time = %entry.start_time,
                        "booking due for reminder"
                    );
                }
                if !entries.is_empty() {
                    info!(count = entries.len(), "reminder selection pass completed");
                }
            }
            Err(e) => {
                error!("failed to select bookings for reminder: {:?}", e);
            }
        }
    }
}

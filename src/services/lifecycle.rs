//! lifecycle.rs
//!
//! Три независимые оси статуса брони: действительность, оплата, явка.
//! Оси обновляются по отдельности, обновление одной никогда не трогает
//! другие. Отмена (ось действительности) терминальна и закрывает бронь
//! для любых дальнейших переходов.

use std::sync::Arc;

use tracing::info;

use crate::models::{ClientStatus, PaymentStatus};
use crate::store::{BookingStore, StoreError};

#[derive(Clone)]
pub struct LifecycleService {
    store: Arc<dyn BookingStore>,
}

impl LifecycleService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Частичное обновление: меняются только переданные оси. Без полей -
    /// false без обращения к хранилищу; false же, если брони нет или она
    /// отменена.
    pub async fn update_status(
        &self,
        booking_id: i64,
        client: Option<ClientStatus>,
        payment: Option<PaymentStatus>,
    ) -> Result<bool, StoreError> {
        if client.is_none() && payment.is_none() {
            return Ok(false);
        }
        let updated = self.store.update_statuses(booking_id, client, payment).await?;
        if updated {
            info!(
                booking_id,
                client_status = client.map(|s| s.as_str()),
                payment_status = payment.map(|s| s.as_str()),
                "booking status updated"
            );
        }
        Ok(updated)
    }
}

//! reservation.rs
//!
//! Координатор бронирования - транзакционное ядро системы.
//!
//! Каждая попытка брони выполняется под эксклюзивной блокировкой слота:
//! проверка занятости и вставка брони видят одно и то же состояние, поэтому
//! никакая комбинация конкурентных запросов не пересаживает слот сверх
//! вместимости. Попытки на разные слоты не конкурируют. Любой отказ после
//! захвата блокировки откатывает транзакцию целиком - частичных записей
//! не бывает.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use crate::models::{Booking, NewBooking, NewBookingChild, SlotStatus};
use crate::services::{capacity, promo};
use crate::services::{CapacityError, Occupancy, PromoError};
use crate::store::{BookingStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ReserveError {
    #[error("slot not found")]
    SlotNotFound,

    #[error("slot is not open for reservations")]
    SlotClosed,

    #[error("holder already has an active booking on this slot")]
    DuplicateBooking,

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error(transparent)]
    Promo(#[from] PromoError),

    /// Блокировку слота не удалось получить за отведённое время даже после
    /// внутренних повторов. Запрос можно безопасно повторить.
    #[error("slot is busy, retry the reservation")]
    Busy,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ReserveError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Busy => ReserveError::Busy,
            other => ReserveError::Store(other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChildRequest {
    pub child_id: Option<i64>,
    pub age_category: String,
    pub price: i64,
    pub weight: Option<i32>,
}

/// Запрос на бронь: слот, взрослый держатель, дети, опциональный промокод.
/// `price` - базовая цена за взрослого; дети несут свои вклады в цену.
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub slot_id: i64,
    pub holder_id: i64,
    pub holder_weight: Option<i32>,
    pub children: Vec<ChildRequest>,
    pub promo_code: Option<String>,
    pub price: i64,
    pub creator_id: Option<i64>,
}

#[derive(Clone)]
pub struct ReservationService {
    store: Arc<dyn BookingStore>,
    max_retries: u32,
}

impl ReservationService {
    pub fn new(store: Arc<dyn BookingStore>, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    /// Создаёт бронь или возвращает типизированный отказ. Транзиентные
    /// конфликты (блокировка, сериализация) повторяются изнутри до
    /// `max_retries` раз, после чего наружу уходит `Busy`.
    pub async fn reserve(&self, req: ReserveRequest) -> Result<Booking, ReserveError> {
        let mut attempt = 0u32;
        loop {
            match self.try_reserve(&req).await {
                Err(ReserveError::Busy) if attempt < self.max_retries => {
                    attempt += 1;
                    debug!(slot_id = req.slot_id, attempt, "slot contended, retrying reservation");
                    tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
                }
                other => return other,
            }
        }
    }

    async fn try_reserve(&self, req: &ReserveRequest) -> Result<Booking, ReserveError> {
        let now = Utc::now().naive_utc();

        // 1. Транзакция + эксклюзивная блокировка слота
        let mut tx = self.store.lock_slot(req.slot_id).await?;

        // 2. Слот существует и открыт для брони
        let slot = tx.slot().cloned().ok_or(ReserveError::SlotNotFound)?;
        if slot.status != SlotStatus::Scheduled {
            return Err(ReserveError::SlotClosed);
        }

        // 3. Не больше одной активной брони на пару (держатель, слот)
        if tx.holder_has_active_booking(req.holder_id).await? {
            return Err(ReserveError::DuplicateBooking);
        }

        // 4. Занятость считается в той же транзакции, что и вставка
        let current = capacity::occupancy_of(&tx.active_occupants().await?);
        let party_people = 1 + req.children.len() as i64;
        let party_weight = i64::from(req.holder_weight.unwrap_or(0))
            + req
                .children
                .iter()
                .map(|c| i64::from(c.weight.unwrap_or(0)))
                .sum::<i64>();
        capacity::check_fit(&slot, current, party_people, party_weight)?;

        // 5. Промокод: проверка окна и лимита, списание атомарно со вставкой
        let base_total = req.price + req.children.iter().map(|c| c.price).sum::<i64>();
        let (total_price, promo_code_id) = match &req.promo_code {
            Some(code) => {
                let found = tx.promo_by_code(code).await?.ok_or(PromoError::NotFound)?;
                promo::validate(&found, now)?;
                if !tx.redeem_promo(found.id).await? {
                    // Лимит выбрала конкурентная транзакция
                    return Err(PromoError::UsageExhausted.into());
                }
                (promo::apply(base_total, &found), Some(found.id))
            }
            None => (base_total, None),
        };

        // 6. Вставка брони с детьми и фиксация; Drop без commit при любом
        // отказе выше откатывает всё разом
        let children: Vec<NewBookingChild> = req
            .children
            .iter()
            .map(|c| NewBookingChild {
                child_id: c.child_id,
                age_category: c.age_category.clone(),
                price: c.price,
                weight: c.weight,
            })
            .collect();
        let booking = tx
            .insert_booking(
                NewBooking {
                    slot_id: req.slot_id,
                    holder_id: req.holder_id,
                    creator_id: req.creator_id,
                    promo_code_id,
                    total_price,
                    holder_weight: req.holder_weight,
                    created_at: now,
                },
                &children,
            )
            .await?;
        tx.commit().await?;

        info!(
            booking_id = booking.id,
            slot_id = req.slot_id,
            holder_id = req.holder_id,
            people = party_people,
            total_price,
            "booking created"
        );
        Ok(booking)
    }

    /// Отмена брони. Терминальна; освобождённая вместимость сразу доступна
    /// следующим попыткам - занятость выводится из живых активных строк.
    pub async fn cancel(&self, booking_id: i64) -> Result<bool, StoreError> {
        let cancelled = self.store.cancel_booking(booking_id).await?;
        if cancelled {
            info!(booking_id, "booking cancelled, capacity released");
        }
        Ok(cancelled)
    }

    /// Текущая занятость слота по зафиксированному состоянию - для
    /// отображения свободных мест.
    pub async fn occupancy(&self, slot_id: i64) -> Result<Occupancy, StoreError> {
        let occupants = self.store.active_occupants(slot_id).await?;
        Ok(capacity::occupancy_of(&occupants))
    }
}

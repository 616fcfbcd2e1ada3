//! Встроенный бэкенд хранилища: все данные в памяти процесса.
//!
//! Используется тестами и локальной разработкой. Контракт тот же, что у
//! Postgres-бэкенда: эксклюзивная область на слот - mutex этого слота с
//! ограниченным ожиданием, брони с детьми становятся видимыми атомарно
//! на commit, инкремент промокода откатывается при Drop без commit.

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

use crate::models::{
    Booking, BookingChild, BookingStatus, ClientStatus, Excursion, NewBooking, NewBookingChild,
    NewExcursion, NewPromoCode, NewSlot, PaymentStatus, PromoCode, Slot, SlotStatus,
};

use super::{BookingStore, Occupant, ReminderEntry, SlotGuard, StoreError};

const DEFAULT_LOCK_WAIT: Duration = Duration::from_millis(2000);

#[derive(Default)]
struct MemInner {
    excursions: HashMap<i64, Excursion>,
    slots: HashMap<i64, Slot>,
    bookings: HashMap<i64, Booking>,
    // Дети сгруппированы по id брони
    children: HashMap<i64, Vec<BookingChild>>,
    promos: HashMap<i64, PromoCode>,
    next_id: i64,
}

impl MemInner {
    fn alloc_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

pub struct MemoryStore {
    inner: Arc<Mutex<MemInner>>,
    slot_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
    lock_wait: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_wait(DEFAULT_LOCK_WAIT)
    }

    pub fn with_lock_wait(lock_wait: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemInner::default())),
            slot_locks: Mutex::new(HashMap::new()),
            lock_wait,
        }
    }

    fn slot_lock(&self, slot_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.slot_locks.lock().unwrap();
        locks
            .entry(slot_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn occupants_of(inner: &MemInner, slot_id: i64) -> Vec<Occupant> {
    let mut occupants = Vec::new();
    for booking in inner.bookings.values() {
        if booking.slot_id != slot_id || booking.booking_status != BookingStatus::Active {
            continue;
        }
        occupants.push(Occupant {
            weight: booking.holder_weight,
        });
        if let Some(children) = inner.children.get(&booking.id) {
            for child in children {
                occupants.push(Occupant {
                    weight: child.weight,
                });
            }
        }
    }
    occupants
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn create_excursion(&self, new: NewExcursion) -> Result<Excursion, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.excursions.values().any(|e| e.name == new.name) {
            return Err(StoreError::Duplicate("excursion name"));
        }
        let id = inner.alloc_id();
        let excursion = Excursion {
            id,
            name: new.name,
            description: new.description,
            duration_minutes: new.duration_minutes,
            base_price: new.base_price,
            is_active: true,
            created_at: Utc::now().naive_utc(),
        };
        inner.excursions.insert(id, excursion.clone());
        Ok(excursion)
    }

    async fn excursion_by_id(&self, id: i64) -> Result<Option<Excursion>, StoreError> {
        Ok(self.inner.lock().unwrap().excursions.get(&id).cloned())
    }

    async fn excursion_by_name(&self, name: &str) -> Result<Option<Excursion>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.excursions.values().find(|e| e.name == name).cloned())
    }

    async fn list_excursions(&self, include_inactive: bool) -> Result<Vec<Excursion>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut excursions: Vec<Excursion> = inner
            .excursions
            .values()
            .filter(|e| include_inactive || e.is_active)
            .cloned()
            .collect();
        excursions.sort_by_key(|e| e.id);
        Ok(excursions)
    }

    async fn set_excursion_active(&self, id: i64, active: bool) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.excursions.get_mut(&id) {
            Some(excursion) => {
                excursion.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_slot(&self, new: NewSlot) -> Result<Slot, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.excursions.contains_key(&new.excursion_id) {
            return Err(StoreError::MissingReference("excursion"));
        }
        let id = inner.alloc_id();
        let slot = Slot {
            id,
            excursion_id: new.excursion_id,
            start_time: new.start_time,
            max_people: new.max_people,
            max_weight: new.max_weight,
            captain_id: new.captain_id,
            status: SlotStatus::Scheduled,
        };
        inner.slots.insert(id, slot.clone());
        Ok(slot)
    }

    async fn slot_by_id(&self, id: i64) -> Result<Option<Slot>, StoreError> {
        Ok(self.inner.lock().unwrap().slots.get(&id).cloned())
    }

    async fn list_slots(&self, excursion_id: Option<i64>) -> Result<Vec<Slot>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut slots: Vec<Slot> = inner
            .slots
            .values()
            .filter(|s| excursion_id.map_or(true, |eid| s.excursion_id == eid))
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.start_time, s.id));
        Ok(slots)
    }

    async fn set_slot_status(&self, id: i64, status: SlotStatus) -> Result<bool, StoreError> {
        // Смена статуса сериализуется с бронированием того же слота, как
        // блокировка строки в Postgres-бэкенде
        let lock = self.slot_lock(id);
        let _guard = tokio::time::timeout(self.lock_wait, lock.lock())
            .await
            .map_err(|_| StoreError::Busy)?;
        let mut inner = self.inner.lock().unwrap();
        match inner.slots.get_mut(&id) {
            Some(slot) => {
                slot.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_promo(&self, new: NewPromoCode) -> Result<PromoCode, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.promos.values().any(|p| p.code == new.code) {
            return Err(StoreError::Duplicate("promo code"));
        }
        let id = inner.alloc_id();
        let promo = PromoCode {
            id,
            code: new.code,
            discount: new.discount,
            discount_value: new.discount_value,
            valid_from: new.valid_from,
            valid_until: new.valid_until,
            usage_limit: new.usage_limit,
            usage_count: 0,
        };
        inner.promos.insert(id, promo.clone());
        Ok(promo)
    }

    async fn promo_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.promos.values().find(|p| p.code == code).cloned())
    }

    async fn booking_by_id(&self, id: i64) -> Result<Option<Booking>, StoreError> {
        Ok(self.inner.lock().unwrap().bookings.get(&id).cloned())
    }

    async fn booking_children(&self, booking_id: i64) -> Result<Vec<BookingChild>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.children.get(&booking_id).cloned().unwrap_or_default())
    }

    async fn bookings_by_holder(&self, holder_id: i64) -> Result<Vec<Booking>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut bookings: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| b.holder_id == holder_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(bookings)
    }

    async fn active_occupants(&self, slot_id: i64) -> Result<Vec<Occupant>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(occupants_of(&inner, slot_id))
    }

    async fn update_statuses(
        &self,
        booking_id: i64,
        client: Option<ClientStatus>,
        payment: Option<PaymentStatus>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(booking) = inner.bookings.get_mut(&booking_id) else {
            return Ok(false);
        };
        // Отмена терминальна для всех осей
        if booking.booking_status != BookingStatus::Active {
            return Ok(false);
        }
        if let Some(status) = client {
            booking.client_status = status;
        }
        if let Some(status) = payment {
            booking.payment_status = status;
        }
        Ok(true)
    }

    async fn cancel_booking(&self, booking_id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(booking) = inner.bookings.get_mut(&booking_id) else {
            return Ok(false);
        };
        if booking.booking_status != BookingStatus::Active {
            return Ok(false);
        }
        booking.booking_status = BookingStatus::Cancelled;
        Ok(true)
    }

    async fn upcoming_for_reminder(
        &self,
        now: NaiveDateTime,
        window_hours: i64,
    ) -> Result<Vec<ReminderEntry>, StoreError> {
        let until = now + chrono::Duration::hours(window_hours);
        let inner = self.inner.lock().unwrap();
        let mut entries = Vec::new();
        for booking in inner.bookings.values() {
            if booking.booking_status != BookingStatus::Active
                || booking.payment_status != PaymentStatus::Paid
            {
                continue;
            }
            let Some(slot) = inner.slots.get(&booking.slot_id) else {
                continue;
            };
            if slot.start_time <= now || slot.start_time > until {
                continue;
            }
            let excursion_name = inner
                .excursions
                .get(&slot.excursion_id)
                .map(|e| e.name.clone())
                .unwrap_or_default();
            entries.push(ReminderEntry {
                booking_id: booking.id,
                slot_id: booking.slot_id,
                holder_id: booking.holder_id,
                excursion_name,
                start_time: slot.start_time,
                total_price: booking.total_price,
            });
        }
        entries.sort_by_key(|e| (e.start_time, e.booking_id));
        Ok(entries)
    }

    async fn lock_slot(&self, slot_id: i64) -> Result<Box<dyn SlotGuard>, StoreError> {
        let lock = self.slot_lock(slot_id);
        let guard = tokio::time::timeout(self.lock_wait, lock.lock_owned())
            .await
            .map_err(|_| StoreError::Busy)?;
        let slot = self.inner.lock().unwrap().slots.get(&slot_id).cloned();
        Ok(Box::new(MemSlotGuard {
            inner: self.inner.clone(),
            _lock: guard,
            slot_id,
            slot,
            staged: None,
            redeemed_promo: None,
            committed: false,
        }))
    }
}

struct MemSlotGuard {
    inner: Arc<Mutex<MemInner>>,
    _lock: OwnedMutexGuard<()>,
    slot_id: i64,
    slot: Option<Slot>,
    // Бронь с детьми применяется целиком на commit
    staged: Option<(Booking, Vec<BookingChild>)>,
    // Инкремент применён сразу; откат - в Drop, если commit не случился
    redeemed_promo: Option<i64>,
    committed: bool,
}

#[async_trait]
impl SlotGuard for MemSlotGuard {
    fn slot(&self) -> Option<&Slot> {
        self.slot.as_ref()
    }

    async fn active_occupants(&mut self) -> Result<Vec<Occupant>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(occupants_of(&inner, self.slot_id))
    }

    async fn holder_has_active_booking(&mut self, holder_id: i64) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.bookings.values().any(|b| {
            b.slot_id == self.slot_id
                && b.holder_id == holder_id
                && b.booking_status == BookingStatus::Active
        }))
    }

    async fn promo_by_code(&mut self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.promos.values().find(|p| p.code == code).cloned())
    }

    async fn redeem_promo(&mut self, promo_id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(promo) = inner.promos.get_mut(&promo_id) else {
            return Err(StoreError::MissingReference("promo code"));
        };
        if promo.usage_count >= promo.usage_limit {
            return Ok(false);
        }
        promo.usage_count += 1;
        self.redeemed_promo = Some(promo_id);
        Ok(true)
    }

    async fn insert_booking(
        &mut self,
        booking: NewBooking,
        children: &[NewBookingChild],
    ) -> Result<Booking, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let booking_id = inner.alloc_id();
        let stored = Booking {
            id: booking_id,
            slot_id: booking.slot_id,
            holder_id: booking.holder_id,
            creator_id: booking.creator_id,
            promo_code_id: booking.promo_code_id,
            total_price: booking.total_price,
            holder_weight: booking.holder_weight,
            booking_status: BookingStatus::Active,
            payment_status: PaymentStatus::NotPaid,
            client_status: ClientStatus::NotArrived,
            created_at: booking.created_at,
        };
        let stored_children: Vec<BookingChild> = children
            .iter()
            .map(|child| BookingChild {
                id: inner.alloc_id(),
                booking_id,
                child_id: child.child_id,
                age_category: child.age_category.clone(),
                price: child.price,
                weight: child.weight,
            })
            .collect();
        self.staged = Some((stored.clone(), stored_children));
        Ok(stored)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if let Some((booking, children)) = self.staged.take() {
            let mut inner = self.inner.lock().unwrap();
            inner.children.insert(booking.id, children);
            inner.bookings.insert(booking.id, booking);
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for MemSlotGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Some(promo_id) = self.redeemed_promo {
            let mut inner = self.inner.lock().unwrap();
            if let Some(promo) = inner.promos.get_mut(&promo_id) {
                promo.usage_count -= 1;
            }
        }
    }
}

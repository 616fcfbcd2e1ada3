//! store
//!
//! Слой хранения для ядра бронирования. Ядро само ничего не пишет на диск:
//! вся работа идёт через трейт `BookingStore`, а эксклюзивная область
//! транзакции для слота - через `SlotGuard`.
//!
//! Бэкенды:
//! - `postgres` - боевой (sqlx, блокировка строки слота через FOR UPDATE);
//! - `memory` - встроенный, для тестов и локальной разработки.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::models::{
    Booking, BookingChild, ClientStatus, Excursion, NewBooking, NewBookingChild, NewExcursion,
    NewPromoCode, NewSlot, PaymentStatus, PromoCode, Slot, SlotStatus,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Слот (или строка промокода) заблокирован конкурентной транзакцией
    /// дольше допустимого ожидания. Повтор операции безопасен.
    #[error("record is locked by a concurrent transaction")]
    Busy,

    #[error("referenced {0} does not exist")]
    MissingReference(&'static str),

    #[error("duplicate {0}")]
    Duplicate(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Один занятый человек на слоте (взрослый держатель или ребёнок).
#[derive(Debug, Clone, Copy)]
pub struct Occupant {
    pub weight: Option<i32>,
}

/// Бронь, попавшая в окно напоминаний, вместе с данными слота.
#[derive(Debug, Clone, Serialize)]
pub struct ReminderEntry {
    pub booking_id: i64,
    pub slot_id: i64,
    pub holder_id: i64,
    pub excursion_name: String,
    pub start_time: NaiveDateTime,
    pub total_price: i64,
}

/// Контракт хранилища, который обязан выполнять любой бэкенд.
#[async_trait]
pub trait BookingStore: Send + Sync {
    // --- Экскурсии ---

    async fn create_excursion(&self, new: NewExcursion) -> Result<Excursion, StoreError>;
    async fn excursion_by_id(&self, id: i64) -> Result<Option<Excursion>, StoreError>;
    async fn excursion_by_name(&self, name: &str) -> Result<Option<Excursion>, StoreError>;
    async fn list_excursions(&self, include_inactive: bool) -> Result<Vec<Excursion>, StoreError>;
    /// Деактивация вместо удаления: на экскурсию могут ссылаться брони.
    async fn set_excursion_active(&self, id: i64, active: bool) -> Result<bool, StoreError>;

    // --- Слоты ---

    async fn create_slot(&self, new: NewSlot) -> Result<Slot, StoreError>;
    async fn slot_by_id(&self, id: i64) -> Result<Option<Slot>, StoreError>;
    async fn list_slots(&self, excursion_id: Option<i64>) -> Result<Vec<Slot>, StoreError>;
    async fn set_slot_status(&self, id: i64, status: SlotStatus) -> Result<bool, StoreError>;

    // --- Промокоды ---

    async fn create_promo(&self, new: NewPromoCode) -> Result<PromoCode, StoreError>;
    async fn promo_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError>;

    // --- Брони: чтения и обновления вне области блокировки ---

    async fn booking_by_id(&self, id: i64) -> Result<Option<Booking>, StoreError>;
    async fn booking_children(&self, booking_id: i64) -> Result<Vec<BookingChild>, StoreError>;
    async fn bookings_by_holder(&self, holder_id: i64) -> Result<Vec<Booking>, StoreError>;

    /// Все занятые места слота по активным броням: по одной записи на
    /// взрослого держателя и на каждого ребёнка. Снимок зафиксированного
    /// состояния - для интерфейса; координатор читает то же самое внутри
    /// `SlotGuard`.
    async fn active_occupants(&self, slot_id: i64) -> Result<Vec<Occupant>, StoreError>;

    /// Частичное обновление осей payment/client одной записью. Возвращает
    /// false, если брони нет или она отменена (отмена терминальна).
    async fn update_statuses(
        &self,
        booking_id: i64,
        client: Option<ClientStatus>,
        payment: Option<PaymentStatus>,
    ) -> Result<bool, StoreError>;

    /// active -> cancelled, единственный разрешённый переход. Возвращает
    /// false, если брони нет или она уже отменена.
    async fn cancel_booking(&self, booking_id: i64) -> Result<bool, StoreError>;

    /// Брони для напоминания: активные, оплаченные, слот стартует строго
    /// позже `now` и не позже `now + window_hours`. Порядок стабильный:
    /// (start_time, booking_id).
    async fn upcoming_for_reminder(
        &self,
        now: NaiveDateTime,
        window_hours: i64,
    ) -> Result<Vec<ReminderEntry>, StoreError>;

    // --- Транзакционная область ---

    /// Открывает транзакцию и захватывает эксклюзивную блокировку слота.
    /// Конкурентные вызовы для одного слота сериализуются; ожидание
    /// ограничено, по истечении - `StoreError::Busy`. Слоты с разными id
    /// не конкурируют между собой.
    async fn lock_slot(&self, slot_id: i64) -> Result<Box<dyn SlotGuard>, StoreError>;
}

/// Открытая транзакция с захваченным слотом. Все чтения и записи внутри
/// видят согласованное состояние слота. Drop без `commit` откатывает всё,
/// включая инкремент промокода.
#[async_trait]
pub trait SlotGuard: Send {
    /// Слот, под который взята блокировка. None - слот не существует.
    fn slot(&self) -> Option<&Slot>;

    async fn active_occupants(&mut self) -> Result<Vec<Occupant>, StoreError>;

    async fn holder_has_active_booking(&mut self, holder_id: i64) -> Result<bool, StoreError>;

    async fn promo_by_code(&mut self, code: &str) -> Result<Option<PromoCode>, StoreError>;

    /// Атомарный инкремент usage_count с проверкой лимита. false - лимит
    /// уже исчерпан (в том числе конкурентной транзакцией).
    async fn redeem_promo(&mut self, promo_id: i64) -> Result<bool, StoreError>;

    /// Вставка брони вместе с детьми. До commit запись не видна читателям.
    async fn insert_booking(
        &mut self,
        booking: NewBooking,
        children: &[NewBookingChild],
    ) -> Result<Booking, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

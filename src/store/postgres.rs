//! Боевой бэкенд хранилища на Postgres.
//!
//! Сериализация конкурентных броней - блокировка строки слота
//! (`SELECT ... FOR UPDATE`) с ограниченным ожиданием через
//! `SET LOCAL lock_timeout`. Попытки на разные слоты не конкурируют.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::{
    Booking, BookingChild, BookingStatus, ClientStatus, DiscountKind, Excursion, NewBooking,
    NewBookingChild, NewExcursion, NewPromoCode, NewSlot, PaymentStatus, PromoCode, Slot,
    SlotStatus,
};

use super::{BookingStore, Occupant, ReminderEntry, SlotGuard, StoreError};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_wait_ms: u64,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_wait_ms: u64) -> Self {
        Self { pool, lock_wait_ms }
    }
}

/* ---------- строки БД и их разбор ---------- */

#[derive(sqlx::FromRow)]
struct SlotRow {
    id: i64,
    excursion_id: i64,
    start_time: NaiveDateTime,
    max_people: i32,
    max_weight: Option<i32>,
    captain_id: Option<i64>,
    status: String,
}

impl SlotRow {
    fn into_slot(self) -> Result<Slot, StoreError> {
        let status = SlotStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("slot status '{}'", self.status)))?;
        Ok(Slot {
            id: self.id,
            excursion_id: self.excursion_id,
            start_time: self.start_time,
            max_people: self.max_people,
            max_weight: self.max_weight,
            captain_id: self.captain_id,
            status,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: i64,
    slot_id: i64,
    holder_id: i64,
    creator_id: Option<i64>,
    promo_code_id: Option<i64>,
    total_price: i64,
    holder_weight: Option<i32>,
    booking_status: String,
    payment_status: String,
    client_status: String,
    created_at: NaiveDateTime,
}

impl BookingRow {
    fn into_booking(self) -> Result<Booking, StoreError> {
        let booking_status = BookingStatus::parse(&self.booking_status)
            .ok_or_else(|| StoreError::Corrupt(format!("booking status '{}'", self.booking_status)))?;
        let payment_status = PaymentStatus::parse(&self.payment_status)
            .ok_or_else(|| StoreError::Corrupt(format!("payment status '{}'", self.payment_status)))?;
        let client_status = ClientStatus::parse(&self.client_status)
            .ok_or_else(|| StoreError::Corrupt(format!("client status '{}'", self.client_status)))?;
        Ok(Booking {
            id: self.id,
            slot_id: self.slot_id,
            holder_id: self.holder_id,
            creator_id: self.creator_id,
            promo_code_id: self.promo_code_id,
            total_price: self.total_price,
            holder_weight: self.holder_weight,
            booking_status,
            payment_status,
            client_status,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PromoRow {
    id: i64,
    code: String,
    discount_type: String,
    discount_value: i64,
    valid_from: NaiveDateTime,
    valid_until: NaiveDateTime,
    usage_limit: i32,
    usage_count: i32,
}

impl PromoRow {
    fn into_promo(self) -> Result<PromoCode, StoreError> {
        let discount = DiscountKind::parse(&self.discount_type)
            .ok_or_else(|| StoreError::Corrupt(format!("discount type '{}'", self.discount_type)))?;
        Ok(PromoCode {
            id: self.id,
            code: self.code,
            discount,
            discount_value: self.discount_value,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            usage_limit: self.usage_limit,
            usage_count: self.usage_count,
        })
    }
}

const SLOT_COLUMNS: &str =
    "id, excursion_id, start_time, max_people, max_weight, captain_id, status";
const BOOKING_COLUMNS: &str = "id, slot_id, holder_id, creator_id, promo_code_id, total_price, \
     holder_weight, booking_status, payment_status, client_status, created_at";
const PROMO_COLUMNS: &str =
    "id, code, discount_type, discount_value, valid_from, valid_until, usage_limit, usage_count";

const OCCUPANTS_SQL: &str = r#"
    SELECT b.holder_weight AS weight
    FROM bookings b
    WHERE b.slot_id = $1 AND b.booking_status = 'active'
    UNION ALL
    SELECT c.weight
    FROM booking_children c
    JOIN bookings b ON b.id = c.booking_id
    WHERE b.slot_id = $1 AND b.booking_status = 'active'
"#;

fn pg_code(e: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db) = e {
        db.code().map(|c| c.to_string())
    } else {
        None
    }
}

/// Ожидание блокировки истекло или транзакция попала в конфликт
/// сериализации - обе ситуации безопасно повторить с начала.
fn busy_or_db(e: sqlx::Error) -> StoreError {
    match pg_code(&e).as_deref() {
        Some("55P03") | Some("40001") | Some("40P01") => StoreError::Busy,
        _ => StoreError::Database(e),
    }
}

fn duplicate_or_db(e: sqlx::Error, what: &'static str) -> StoreError {
    match pg_code(&e).as_deref() {
        Some("23505") => StoreError::Duplicate(what),
        _ => StoreError::Database(e),
    }
}

fn missing_ref_or_db(e: sqlx::Error, what: &'static str) -> StoreError {
    match pg_code(&e).as_deref() {
        Some("23503") => StoreError::MissingReference(what),
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn create_excursion(&self, new: NewExcursion) -> Result<Excursion, StoreError> {
        let row: (i64, NaiveDateTime) = sqlx::query_as(
            "INSERT INTO excursions (name, description, duration_minutes, base_price)
             VALUES ($1, $2, $3, $4)
             RETURNING id, created_at",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.duration_minutes)
        .bind(new.base_price)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| duplicate_or_db(e, "excursion name"))?;

        Ok(Excursion {
            id: row.0,
            name: new.name,
            description: new.description,
            duration_minutes: new.duration_minutes,
            base_price: new.base_price,
            is_active: true,
            created_at: row.1,
        })
    }

    async fn excursion_by_id(&self, id: i64) -> Result<Option<Excursion>, StoreError> {
        let row = sqlx::query_as::<_, Excursion>("SELECT * FROM excursions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn excursion_by_name(&self, name: &str) -> Result<Option<Excursion>, StoreError> {
        let row = sqlx::query_as::<_, Excursion>("SELECT * FROM excursions WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_excursions(&self, include_inactive: bool) -> Result<Vec<Excursion>, StoreError> {
        let sql = if include_inactive {
            "SELECT * FROM excursions ORDER BY id"
        } else {
            "SELECT * FROM excursions WHERE is_active = TRUE ORDER BY id"
        };
        let rows = sqlx::query_as::<_, Excursion>(sql).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn set_excursion_active(&self, id: i64, active: bool) -> Result<bool, StoreError> {
        let res = sqlx::query("UPDATE excursions SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn create_slot(&self, new: NewSlot) -> Result<Slot, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO slots (excursion_id, start_time, max_people, max_weight, captain_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(new.excursion_id)
        .bind(new.start_time)
        .bind(new.max_people)
        .bind(new.max_weight)
        .bind(new.captain_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_ref_or_db(e, "excursion"))?;

        Ok(Slot {
            id,
            excursion_id: new.excursion_id,
            start_time: new.start_time,
            max_people: new.max_people,
            max_weight: new.max_weight,
            captain_id: new.captain_id,
            status: SlotStatus::Scheduled,
        })
    }

    async fn slot_by_id(&self, id: i64) -> Result<Option<Slot>, StoreError> {
        let row: Option<SlotRow> =
            sqlx::query_as(&format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(SlotRow::into_slot).transpose()
    }

    async fn list_slots(&self, excursion_id: Option<i64>) -> Result<Vec<Slot>, StoreError> {
        let rows: Vec<SlotRow> = match excursion_id {
            Some(eid) => {
                sqlx::query_as(&format!(
                    "SELECT {SLOT_COLUMNS} FROM slots WHERE excursion_id = $1 ORDER BY start_time, id"
                ))
                .bind(eid)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {SLOT_COLUMNS} FROM slots ORDER BY start_time, id"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(SlotRow::into_slot).collect()
    }

    async fn set_slot_status(&self, id: i64, status: SlotStatus) -> Result<bool, StoreError> {
        let res = sqlx::query("UPDATE slots SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn create_promo(&self, new: NewPromoCode) -> Result<PromoCode, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO promo_codes (code, discount_type, discount_value, valid_from, valid_until, usage_limit)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(&new.code)
        .bind(new.discount.as_str())
        .bind(new.discount_value)
        .bind(new.valid_from)
        .bind(new.valid_until)
        .bind(new.usage_limit)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| duplicate_or_db(e, "promo code"))?;

        Ok(PromoCode {
            id,
            code: new.code,
            discount: new.discount,
            discount_value: new.discount_value,
            valid_from: new.valid_from,
            valid_until: new.valid_until,
            usage_limit: new.usage_limit,
            usage_count: 0,
        })
    }

    async fn promo_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        let row: Option<PromoRow> =
            sqlx::query_as(&format!("SELECT {PROMO_COLUMNS} FROM promo_codes WHERE code = $1"))
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
        row.map(PromoRow::into_promo).transpose()
    }

    async fn booking_by_id(&self, id: i64) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(BookingRow::into_booking).transpose()
    }

    async fn booking_children(&self, booking_id: i64) -> Result<Vec<BookingChild>, StoreError> {
        let rows = sqlx::query_as::<_, BookingChild>(
            "SELECT id, booking_id, child_id, age_category, price, weight
             FROM booking_children WHERE booking_id = $1 ORDER BY id",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn bookings_by_holder(&self, holder_id: i64) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE holder_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(holder_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(BookingRow::into_booking).collect()
    }

    async fn active_occupants(&self, slot_id: i64) -> Result<Vec<Occupant>, StoreError> {
        let weights: Vec<Option<i32>> = sqlx::query_scalar(OCCUPANTS_SQL)
            .bind(slot_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(weights.into_iter().map(|weight| Occupant { weight }).collect())
    }

    async fn update_statuses(
        &self,
        booking_id: i64,
        client: Option<ClientStatus>,
        payment: Option<PaymentStatus>,
    ) -> Result<bool, StoreError> {
        // COALESCE оставляет не переданную ось нетронутой; отменённые брони
        // отфильтрованы - отмена терминальна для всех осей.
        let res = sqlx::query(
            "UPDATE bookings
             SET client_status = COALESCE($2, client_status),
                 payment_status = COALESCE($3, payment_status)
             WHERE id = $1 AND booking_status = 'active'",
        )
        .bind(booking_id)
        .bind(client.map(|s| s.as_str()))
        .bind(payment.map(|s| s.as_str()))
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn cancel_booking(&self, booking_id: i64) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "UPDATE bookings SET booking_status = 'cancelled'
             WHERE id = $1 AND booking_status = 'active'",
        )
        .bind(booking_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn upcoming_for_reminder(
        &self,
        now: NaiveDateTime,
        window_hours: i64,
    ) -> Result<Vec<ReminderEntry>, StoreError> {
        let until = now + chrono::Duration::hours(window_hours);
        let rows: Vec<(i64, i64, i64, String, NaiveDateTime, i64)> = sqlx::query_as(
            r#"
            SELECT b.id, b.slot_id, b.holder_id, e.name, s.start_time, b.total_price
            FROM bookings b
            JOIN slots s ON s.id = b.slot_id
            JOIN excursions e ON e.id = s.excursion_id
            WHERE b.booking_status = 'active'
              AND b.payment_status = 'paid'
              AND s.start_time > $1
              AND s.start_time <= $2
            ORDER BY s.start_time, b.id
            "#,
        )
        .bind(now)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(booking_id, slot_id, holder_id, excursion_name, start_time, total_price)| {
                    ReminderEntry {
                        booking_id,
                        slot_id,
                        holder_id,
                        excursion_name,
                        start_time,
                        total_price,
                    }
                },
            )
            .collect())
    }

    async fn lock_slot(&self, slot_id: i64) -> Result<Box<dyn SlotGuard>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Ограниченное ожидание блокировки строки; по истечении Postgres
        // вернёт 55P03 и попытка завершится StoreError::Busy.
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", self.lock_wait_ms))
            .execute(&mut *tx)
            .await?;

        let row: Option<SlotRow> = sqlx::query_as(&format!(
            "SELECT {SLOT_COLUMNS} FROM slots WHERE id = $1 FOR UPDATE"
        ))
        .bind(slot_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(busy_or_db)?;

        let slot = row.map(SlotRow::into_slot).transpose()?;
        Ok(Box::new(PgSlotGuard { tx, slot_id, slot }))
    }
}

/* ---------- транзакционная область ---------- */

struct PgSlotGuard {
    // Drop транзакции без commit откатывает все записи.
    tx: Transaction<'static, Postgres>,
    slot_id: i64,
    slot: Option<Slot>,
}

#[async_trait]
impl SlotGuard for PgSlotGuard {
    fn slot(&self) -> Option<&Slot> {
        self.slot.as_ref()
    }

    async fn active_occupants(&mut self) -> Result<Vec<Occupant>, StoreError> {
        let weights: Vec<Option<i32>> = sqlx::query_scalar(OCCUPANTS_SQL)
            .bind(self.slot_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(weights.into_iter().map(|weight| Occupant { weight }).collect())
    }

    async fn holder_has_active_booking(&mut self, holder_id: i64) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(
               SELECT 1 FROM bookings
               WHERE slot_id = $1 AND holder_id = $2 AND booking_status = 'active'
             )",
        )
        .bind(self.slot_id)
        .bind(holder_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn promo_by_code(&mut self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        let row: Option<PromoRow> =
            sqlx::query_as(&format!("SELECT {PROMO_COLUMNS} FROM promo_codes WHERE code = $1"))
                .bind(code)
                .fetch_optional(&mut *self.tx)
                .await?;
        row.map(PromoRow::into_promo).transpose()
    }

    async fn redeem_promo(&mut self, promo_id: i64) -> Result<bool, StoreError> {
        // Условный UPDATE атомарен: конкурентная транзакция, удерживающая
        // строку, заставит подождать (в пределах lock_timeout), после чего
        // условие перепроверяется на зафиксированном состоянии.
        let res = sqlx::query(
            "UPDATE promo_codes SET usage_count = usage_count + 1
             WHERE id = $1 AND usage_count < usage_limit",
        )
        .bind(promo_id)
        .execute(&mut *self.tx)
        .await
        .map_err(busy_or_db)?;
        Ok(res.rows_affected() > 0)
    }

    async fn insert_booking(
        &mut self,
        booking: NewBooking,
        children: &[NewBookingChild],
    ) -> Result<Booking, StoreError> {
        let booking_id: i64 = sqlx::query_scalar(
            "INSERT INTO bookings (slot_id, holder_id, creator_id, promo_code_id,
                                   total_price, holder_weight, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(booking.slot_id)
        .bind(booking.holder_id)
        .bind(booking.creator_id)
        .bind(booking.promo_code_id)
        .bind(booking.total_price)
        .bind(booking.holder_weight)
        .bind(booking.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        for child in children {
            sqlx::query(
                "INSERT INTO booking_children (booking_id, child_id, age_category, price, weight)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(booking_id)
            .bind(child.child_id)
            .bind(&child.age_category)
            .bind(child.price)
            .bind(child.weight)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(Booking {
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
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use chrono::NaiveDateTime;

/// Бронирование: один взрослый держатель + дети, три независимые оси статуса.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub slot_id: i64,
    pub holder_id: i64,
    // Сотрудник, оформивший бронь от имени клиента (если бронировал не сам клиент)
    pub creator_id: Option<i64>,
    pub promo_code_id: Option<i64>,
    pub total_price: i64,
    pub holder_weight: Option<i32>,
    pub booking_status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub client_status: ClientStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BookingChild {
    pub id: i64,
    pub booking_id: i64,
    pub child_id: Option<i64>,
    pub age_category: String,
    pub price: i64,
    pub weight: Option<i32>,
}

/// Действительность брони. Отмена терминальна: отменённая бронь не
/// возвращается в active и блокирует изменения на остальных осях.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Active,
    Cancelled,
}

/// Факт получения денег. Не зависит от действительности брони.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    NotPaid,
    Paid,
}

/// Явка клиента. Переключается свободно - сотрудник может исправить ошибку.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    NotArrived,
    Arrived,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "active",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BookingStatus::Active),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::NotPaid => "not_paid",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_paid" => Some(PaymentStatus::NotPaid),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStatus::NotArrived => "not_arrived",
            ClientStatus::Arrived => "arrived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_arrived" => Some(ClientStatus::NotArrived),
            "arrived" => Some(ClientStatus::Arrived),
            _ => None,
        }
    }
}

/// Данные новой брони. Статусы не передаются: новая бронь всегда
/// active / not_paid / not_arrived.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub slot_id: i64,
    pub holder_id: i64,
    pub creator_id: Option<i64>,
    pub promo_code_id: Option<i64>,
    pub total_price: i64,
    pub holder_weight: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewBookingChild {
    pub child_id: Option<i64>,
    pub age_category: String,
    pub price: i64,
    pub weight: Option<i32>,
}

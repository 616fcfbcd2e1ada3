use serde::{Deserialize, Serialize};
use chrono::NaiveDateTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: i64,
    pub code: String,
    pub discount: DiscountKind,
    pub discount_value: i64,
    pub valid_from: NaiveDateTime,
    pub valid_until: NaiveDateTime,
    pub usage_limit: i32,
    pub usage_count: i32,
}

/// Вид скидки: процент от базовой суммы или фиксированная сумма.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percent,
    Fixed,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Percent => "percent",
            DiscountKind::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "percent" => Some(DiscountKind::Percent),
            "fixed" => Some(DiscountKind::Fixed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPromoCode {
    pub code: String,
    pub discount: DiscountKind,
    pub discount_value: i64,
    pub valid_from: NaiveDateTime,
    pub valid_until: NaiveDateTime,
    pub usage_limit: i32,
}

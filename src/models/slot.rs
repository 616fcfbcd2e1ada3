use serde::{Deserialize, Serialize};
use chrono::NaiveDateTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: i64,
    pub excursion_id: i64,
    pub start_time: NaiveDateTime,
    pub max_people: i32,
    pub max_weight: Option<i32>,
    pub captain_id: Option<i64>,
    pub status: SlotStatus,
}

/// Статус конкретного выхода: запланирован, завершён или отменён.
/// Вместимость проверяется только для запланированных выходов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Scheduled => "scheduled",
            SlotStatus::Completed => "completed",
            SlotStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(SlotStatus::Scheduled),
            "completed" => Some(SlotStatus::Completed),
            "cancelled" => Some(SlotStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSlot {
    pub excursion_id: i64,
    pub start_time: NaiveDateTime,
    pub max_people: i32,
    pub max_weight: Option<i32>,
    pub captain_id: Option<i64>,
}

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::NaiveDateTime;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Excursion {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub base_price: i64,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

// Входные данные для создания экскурсии (id и created_at назначает хранилище)
#[derive(Debug, Clone, Deserialize)]
pub struct NewExcursion {
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub base_price: i64,
}

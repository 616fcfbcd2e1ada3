use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::models::NewExcursion;
use crate::store::{BookingStore, StoreError};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/excursions", post(create_excursion))
        .route("/excursions", get(list_excursions))
        .route("/excursions/active", patch(set_excursion_active))
}

/* ---------- ЭКСКУРСИИ ---------- */

// POST /api/excursions
#[derive(Debug, Deserialize)]
struct CreateExcursionRequest {
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub base_price: i64,
}

async fn create_excursion(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateExcursionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Название не может быть пустым".to_string()));
    }
    if req.duration_minutes <= 0 {
        return Err((StatusCode::BAD_REQUEST, "duration_minutes должен быть > 0".to_string()));
    }
    if req.base_price < 0 {
        return Err((StatusCode::BAD_REQUEST, "base_price не может быть отрицательной".to_string()));
    }

    let res = state
        .store
        .create_excursion(NewExcursion {
            name: req.name,
            description: req.description,
            duration_minutes: req.duration_minutes,
            base_price: req.base_price,
        })
        .await;

    match res {
        Ok(excursion) => Ok((StatusCode::CREATED, Json(excursion))),
        Err(StoreError::Duplicate(_)) => Err((
            StatusCode::CONFLICT,
            "Экскурсия с таким названием уже существует".to_string(),
        )),
        Err(e) => {
            tracing::error!("create_excursion store error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Не удалось создать экскурсию".to_string()))
        }
    }
}

// GET /api/excursions?name=...&include_inactive=true
#[derive(Debug, Deserialize)]
struct ExcursionsQuery {
    // Точное имя (с учётом регистра) - вернётся список из 0 или 1 элемента
    name: Option<String>,
    #[serde(default)]
    include_inactive: bool,
}

async fn list_excursions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExcursionsQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let excursions = match &params.name {
        Some(name) => state
            .store
            .excursion_by_name(name)
            .await
            .map(|found| {
                found
                    .into_iter()
                    .filter(|e| params.include_inactive || e.is_active)
                    .collect()
            }),
        None => state.store.list_excursions(params.include_inactive).await,
    }
    .map_err(|e| {
        tracing::error!("list_excursions store error: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Не удалось получить список экскурсий".to_string())
    })?;

    Ok((StatusCode::OK, Json(excursions)))
}

// PATCH /api/excursions/active
// Экскурсии не удаляются - только деактивация и обратное включение
#[derive(Debug, Deserialize)]
struct SetActiveRequest {
    pub excursion_id: i64,
    pub active: bool,
}

async fn set_excursion_active(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetActiveRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.excursion_id <= 0 {
        return Err((StatusCode::BAD_REQUEST, "excursion_id должен быть > 0".to_string()));
    }

    let ok = state
        .store
        .set_excursion_active(req.excursion_id, req.active)
        .await
        .map_err(|e| {
            tracing::error!("set_excursion_active store error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Не удалось обновить экскурсию".to_string())
        })?;

    if ok {
        Ok((StatusCode::OK, Json(json!({"message": "Экскурсия обновлена"}))))
    } else {
        Err((StatusCode::NOT_FOUND, "Экскурсия не найдена".to_string()))
    }
}

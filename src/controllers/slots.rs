use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::models::{NewSlot, SlotStatus};
use crate::store::{BookingStore, StoreError};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/slots", post(create_slot))
        .route("/slots", get(list_slots))
        .route("/slots/status", patch(set_slot_status))
        .route("/slots/occupancy", get(get_slot_occupancy))
}

/* ---------- СЛОТЫ ---------- */

// POST /api/slots
#[derive(Debug, Deserialize)]
struct CreateSlotRequest {
    pub excursion_id: i64,
    pub start_time: NaiveDateTime,
    pub max_people: i32,
    pub max_weight: Option<i32>,
    pub captain_id: Option<i64>,
}

async fn create_slot(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSlotRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.excursion_id <= 0 {
        return Err((StatusCode::BAD_REQUEST, "excursion_id должен быть > 0".to_string()));
    }
    if req.max_people <= 0 {
        return Err((StatusCode::BAD_REQUEST, "max_people должен быть > 0".to_string()));
    }
    if let Some(w) = req.max_weight {
        if w <= 0 {
            return Err((StatusCode::BAD_REQUEST, "max_weight должен быть > 0".to_string()));
        }
    }

    // На деактивированную экскурсию новые слоты не ставятся
    let excursion = state
        .store
        .excursion_by_id(req.excursion_id)
        .await
        .map_err(|e| {
            tracing::error!("excursion_by_id store error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Не удалось проверить экскурсию".to_string())
        })?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Экскурсия не найдена".to_string()))?;
    if !excursion.is_active {
        return Err((StatusCode::CONFLICT, "Экскурсия деактивирована".to_string()));
    }

    let res = state
        .store
        .create_slot(NewSlot {
            excursion_id: req.excursion_id,
            start_time: req.start_time,
            max_people: req.max_people,
            max_weight: req.max_weight,
            captain_id: req.captain_id,
        })
        .await;

    match res {
        Ok(slot) => Ok((StatusCode::CREATED, Json(slot))),
        Err(StoreError::MissingReference(_)) => {
            Err((StatusCode::NOT_FOUND, "Экскурсия не найдена".to_string()))
        }
        Err(e) => {
            tracing::error!("create_slot store error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Не удалось создать слот".to_string()))
        }
    }
}

// GET /api/slots?excursion_id=
#[derive(Debug, Deserialize)]
struct SlotsQuery {
    excursion_id: Option<i64>,
}

async fn list_slots(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SlotsQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Some(eid) = params.excursion_id {
        if eid <= 0 {
            return Err((StatusCode::BAD_REQUEST, "excursion_id должен быть > 0".to_string()));
        }
    }

    let slots = state.store.list_slots(params.excursion_id).await.map_err(|e| {
        tracing::error!("list_slots store error: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Не удалось получить список слотов".to_string())
    })?;

    Ok((StatusCode::OK, Json(slots)))
}

// PATCH /api/slots/status
#[derive(Debug, Deserialize)]
struct SetSlotStatusRequest {
    pub slot_id: i64,
    pub status: SlotStatus,
}

async fn set_slot_status(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetSlotStatusRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.slot_id <= 0 {
        return Err((StatusCode::BAD_REQUEST, "slot_id должен быть > 0".to_string()));
    }

    let ok = state
        .store
        .set_slot_status(req.slot_id, req.status)
        .await
        .map_err(|e| {
            tracing::error!("set_slot_status store error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Не удалось обновить статус слота".to_string())
        })?;

    if ok {
        Ok((StatusCode::OK, Json(json!({"message": "Статус слота обновлён"}))))
    } else {
        Err((StatusCode::NOT_FOUND, "Слот не найден".to_string()))
    }
}

// GET /api/slots/occupancy?slot_id=
// Занятость по зафиксированному состоянию - для отображения свободных мест
#[derive(Debug, Deserialize)]
struct OccupancyQuery {
    slot_id: i64,
}

#[derive(Debug, Serialize)]
struct OccupancyResponse {
    slot_id: i64,
    people: i64,
    weight: i64,
    max_people: i32,
    max_weight: Option<i32>,
    seats_left: i64,
}

async fn get_slot_occupancy(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OccupancyQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if params.slot_id <= 0 {
        return Err((StatusCode::BAD_REQUEST, "slot_id должен быть > 0".to_string()));
    }

    let slot = state
        .store
        .slot_by_id(params.slot_id)
        .await
        .map_err(|e| {
            tracing::error!("slot_by_id store error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Не удалось получить слот".to_string())
        })?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Слот не найден".to_string()))?;

    let occupancy = state.reservations.occupancy(params.slot_id).await.map_err(|e| {
        tracing::error!("occupancy store error: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Не удалось посчитать занятость".to_string())
    })?;

    Ok((
        StatusCode::OK,
        Json(OccupancyResponse {
            slot_id: slot.id,
            people: occupancy.people,
            weight: occupancy.weight,
            max_people: slot.max_people,
            max_weight: slot.max_weight,
            seats_left: (i64::from(slot.max_people) - occupancy.people).max(0),
        }),
    ))
}

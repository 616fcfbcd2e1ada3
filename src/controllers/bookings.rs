use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::models::{Booking, BookingChild, ClientStatus, DiscountKind, NewPromoCode, PaymentStatus};
use crate::services::{CapacityError, ChildRequest, PromoError, ReserveError, ReserveRequest};
use crate::store::{BookingStore, StoreError};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings", get(get_holder_bookings))
        .route("/bookings/cancel", patch(cancel_booking))
        .route("/bookings/status", patch(update_booking_status))
        .route("/bookings/reminders", get(get_upcoming_reminders))
        .route("/promos", post(create_promo))
}

/* ---------- helpers ---------- */

fn status_419() -> StatusCode {
    StatusCode::from_u16(419).unwrap_or(StatusCode::CONFLICT)
}

#[derive(Serialize)]
pub struct ApiError {
    success: bool,
    message: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

fn to_api_error(status: StatusCode, message: &str) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError { success: false, message: message.to_string() }))
}

fn reserve_error_response(e: ReserveError) -> (StatusCode, Json<ApiError>) {
    match e {
        ReserveError::SlotNotFound => to_api_error(StatusCode::NOT_FOUND, "Слот не найден"),
        ReserveError::SlotClosed => {
            to_api_error(status_419(), "Слот недоступен для бронирования")
        }
        ReserveError::DuplicateBooking => {
            to_api_error(status_419(), "У клиента уже есть активная бронь на этот слот")
        }
        ReserveError::Capacity(CapacityError::People { .. }) => {
            to_api_error(status_419(), "Недостаточно свободных мест")
        }
        ReserveError::Capacity(CapacityError::Weight { .. }) => {
            to_api_error(status_419(), "Превышен лимит по весу")
        }
        ReserveError::Promo(PromoError::NotFound) => {
            to_api_error(StatusCode::NOT_FOUND, "Промокод не найден")
        }
        ReserveError::Promo(PromoError::NotYetValid) => {
            to_api_error(StatusCode::BAD_REQUEST, "Промокод ещё не действует")
        }
        ReserveError::Promo(PromoError::Expired) => {
            to_api_error(StatusCode::BAD_REQUEST, "Срок действия промокода истёк")
        }
        ReserveError::Promo(PromoError::UsageExhausted) => {
            to_api_error(status_419(), "Лимит использований промокода исчерпан")
        }
        ReserveError::Busy => to_api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Слот занят другим запросом, повторите попытку",
        ),
        ReserveError::Store(e) => {
            tracing::error!("reserve store error: {:?}", e);
            to_api_error(StatusCode::INTERNAL_SERVER_ERROR, "Не удалось создать бронирование")
        }
    }
}

fn store_error_response(e: StoreError, message: &str) -> (StatusCode, Json<ApiError>) {
    tracing::error!("store error: {:?}", e);
    to_api_error(StatusCode::INTERNAL_SERVER_ERROR, message)
}

/* ---------- БРОНИРОВАНИЯ ---------- */

// POST /api/bookings
#[derive(Debug, Deserialize)]
struct CreateBookingRequest {
    pub slot_id: i64,
    pub holder_id: i64,
    pub holder_weight: Option<i32>,
    #[serde(default)]
    pub children: Vec<ChildRequest>,
    pub promo_code: Option<String>,
    pub price: i64,
    pub creator_id: Option<i64>,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookingRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.slot_id <= 0 || req.holder_id <= 0 {
        return Err(to_api_error(StatusCode::BAD_REQUEST, "slot_id и holder_id должны быть > 0"));
    }
    if req.price < 0 {
        return Err(to_api_error(StatusCode::BAD_REQUEST, "price не может быть отрицательной"));
    }
    for child in &req.children {
        if child.age_category.trim().is_empty() {
            return Err(to_api_error(StatusCode::BAD_REQUEST, "age_category не может быть пустой"));
        }
        if child.price < 0 {
            return Err(to_api_error(StatusCode::BAD_REQUEST, "Цена за ребёнка не может быть отрицательной"));
        }
    }

    let booking = state
        .reservations
        .reserve(ReserveRequest {
            slot_id: req.slot_id,
            holder_id: req.holder_id,
            holder_weight: req.holder_weight,
            children: req.children,
            promo_code: req.promo_code,
            price: req.price,
            creator_id: req.creator_id,
        })
        .await
        .map_err(reserve_error_response)?;

    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings?holder_id=
#[derive(Debug, Deserialize)]
struct HolderBookingsQuery {
    holder_id: i64,
}

#[derive(Debug, Serialize)]
struct BookingResponse {
    #[serde(flatten)]
    booking: Booking,
    children: Vec<BookingChild>,
}

async fn get_holder_bookings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HolderBookingsQuery>,
) -> ApiResult<impl IntoResponse> {
    if params.holder_id <= 0 {
        return Err(to_api_error(StatusCode::BAD_REQUEST, "holder_id должен быть > 0"));
    }

    let bookings = state
        .store
        .bookings_by_holder(params.holder_id)
        .await
        .map_err(|e| store_error_response(e, "Не удалось получить список бронирований"))?;

    let mut payload = Vec::with_capacity(bookings.len());
    for booking in bookings {
        let children = state
            .store
            .booking_children(booking.id)
            .await
            .map_err(|e| store_error_response(e, "Не удалось получить состав бронирования"))?;
        payload.push(BookingResponse { booking, children });
    }

    Ok((StatusCode::OK, Json(payload)))
}

// PATCH /api/bookings/cancel
#[derive(Debug, Deserialize)]
struct CancelBookingRequest {
    pub booking_id: i64,
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CancelBookingRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.booking_id <= 0 {
        return Err(to_api_error(StatusCode::BAD_REQUEST, "booking_id должен быть > 0"));
    }

    let cancelled = state
        .reservations
        .cancel(req.booking_id)
        .await
        .map_err(|e| store_error_response(e, "Не удалось отменить бронирование"))?;

    if cancelled {
        Ok((StatusCode::OK, Json(json!({"message": "Бронь успешно отменена"}))))
    } else {
        Err(to_api_error(status_419(), "Бронирование не найдено или уже отменено"))
    }
}

// PATCH /api/bookings/status
#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    pub booking_id: i64,
    pub client_status: Option<ClientStatus>,
    pub payment_status: Option<PaymentStatus>,
}

async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.booking_id <= 0 {
        return Err(to_api_error(StatusCode::BAD_REQUEST, "booking_id должен быть > 0"));
    }

    // Пустое обновление и отсутствующая бронь - это success: false, не ошибка
    let updated = state
        .lifecycle
        .update_status(req.booking_id, req.client_status, req.payment_status)
        .await
        .map_err(|e| store_error_response(e, "Не удалось обновить статус бронирования"))?;

    Ok((StatusCode::OK, Json(json!({"success": updated}))))
}

// GET /api/bookings/reminders?hours=
#[derive(Debug, Deserialize)]
struct RemindersQuery {
    hours: Option<i64>,
}

async fn get_upcoming_reminders(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RemindersQuery>,
) -> ApiResult<impl IntoResponse> {
    let hours = params.hours.unwrap_or(state.config.reminder.window_hours);
    if hours <= 0 {
        return Err(to_api_error(StatusCode::BAD_REQUEST, "hours должен быть > 0"));
    }

    let entries = state
        .reminders
        .upcoming_for_reminder(hours)
        .await
        .map_err(|e| store_error_response(e, "Не удалось получить список напоминаний"))?;

    Ok((StatusCode::OK, Json(entries)))
}

/* ---------- ПРОМОКОДЫ ---------- */

// POST /api/promos
#[derive(Debug, Deserialize)]
struct CreatePromoRequest {
    pub code: String,
    pub discount: DiscountKind,
    pub discount_value: i64,
    pub valid_from: chrono::NaiveDateTime,
    pub valid_until: chrono::NaiveDateTime,
    pub usage_limit: i32,
}

async fn create_promo(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePromoRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.code.trim().is_empty() {
        return Err(to_api_error(StatusCode::BAD_REQUEST, "code не может быть пустым"));
    }
    if req.valid_from > req.valid_until {
        return Err(to_api_error(StatusCode::BAD_REQUEST, "valid_from должен быть не позже valid_until"));
    }
    if req.usage_limit <= 0 {
        return Err(to_api_error(StatusCode::BAD_REQUEST, "usage_limit должен быть > 0"));
    }
    let value_ok = match req.discount {
        DiscountKind::Percent => (0..=100).contains(&req.discount_value),
        DiscountKind::Fixed => req.discount_value >= 0,
    };
    if !value_ok {
        return Err(to_api_error(StatusCode::BAD_REQUEST, "Недопустимое значение скидки"));
    }

    let promo = state
        .store
        .create_promo(NewPromoCode {
            code: req.code,
            discount: req.discount,
            discount_value: req.discount_value,
            valid_from: req.valid_from,
            valid_until: req.valid_until,
            usage_limit: req.usage_limit,
        })
        .await
        .map_err(|e| match e {
            StoreError::Duplicate(_) => {
                to_api_error(status_419(), "Промокод с таким кодом уже существует")
            }
            other => store_error_response(other, "Не удалось создать промокод"),
        })?;

    Ok((StatusCode::CREATED, Json(promo)))
}

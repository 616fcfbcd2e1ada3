//! Сквозные проверки ядра бронирования поверх встроенного бэкенда:
//! инвариант вместимости под конкурентными запросами, независимость осей
//! статуса, окно напоминаний, конкурентное списание промокода.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as Window, Utc};
use futures::future::join_all;

use excursion_system::models::{
    BookingStatus, ClientStatus, DiscountKind, NewExcursion, NewPromoCode, NewSlot, PaymentStatus,
    SlotStatus,
};
use excursion_system::services::{
    CapacityError, ChildRequest, LifecycleService, PromoError, ReminderService,
    ReservationService, ReserveError, ReserveRequest,
};
use excursion_system::store::{BookingStore, MemoryStore, SlotGuard};

const ADULT_PRICE: i64 = 2000;

async fn setup(max_people: i32, max_weight: Option<i32>) -> (Arc<MemoryStore>, ReservationService, i64) {
    let store = Arc::new(MemoryStore::new());
    let slot_id = make_slot(&store, max_people, max_weight, Window::hours(48)).await;
    let service = ReservationService::new(store.clone(), 3);
    (store, service, slot_id)
}

async fn make_slot(
    store: &Arc<MemoryStore>,
    max_people: i32,
    max_weight: Option<i32>,
    starts_in: Window,
) -> i64 {
    let name = format!("Морская прогулка #{}", rand_suffix());
    let excursion = store
        .create_excursion(NewExcursion {
            name,
            description: None,
            duration_minutes: 90,
            base_price: ADULT_PRICE,
        })
        .await
        .unwrap();
    let slot = store
        .create_slot(NewSlot {
            excursion_id: excursion.id,
            start_time: Utc::now().naive_utc() + starts_in,
            max_people,
            max_weight,
            captain_id: None,
        })
        .await
        .unwrap();
    slot.id
}

fn rand_suffix() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

fn adult(slot_id: i64, holder_id: i64) -> ReserveRequest {
    ReserveRequest {
        slot_id,
        holder_id,
        holder_weight: None,
        children: Vec::new(),
        promo_code: None,
        price: ADULT_PRICE,
        creator_id: None,
    }
}

fn child(age_category: &str, price: i64, weight: Option<i32>) -> ChildRequest {
    ChildRequest {
        child_id: None,
        age_category: age_category.to_string(),
        price,
        weight,
    }
}

/* ---------- вместимость под конкуренцией ---------- */

#[tokio::test]
async fn concurrent_reserves_never_exceed_capacity() {
    let (_store, service, slot_id) = setup(5, None).await;

    let tasks: Vec<_> = (1..=20)
        .map(|holder_id| {
            let service = service.clone();
            tokio::spawn(async move { service.reserve(adult(slot_id, holder_id)).await })
        })
        .collect();

    let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let capacity_rejections = results
        .iter()
        .filter(|r| matches!(r, Err(ReserveError::Capacity(CapacityError::People { .. }))))
        .count();

    assert_eq!(succeeded, 5);
    assert_eq!(capacity_rejections, 15);

    let occupancy = service.occupancy(slot_id).await.unwrap();
    assert_eq!(occupancy.people, 5);
}

#[tokio::test]
async fn concurrent_family_reserves_count_children_toward_capacity() {
    let (_store, service, slot_id) = setup(6, None).await;

    // Каждая заявка занимает три места: взрослый и двое детей
    let tasks: Vec<_> = (1..=4)
        .map(|holder_id| {
            let service = service.clone();
            tokio::spawn(async move {
                let mut req = adult(slot_id, holder_id);
                req.children = vec![child("4-7", 300, None), child("8-12", 500, None)];
                service.reserve(req).await
            })
        })
        .collect();

    let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();

    assert_eq!(succeeded, 2);
    let occupancy = service.occupancy(slot_id).await.unwrap();
    assert_eq!(occupancy.people, 6);
}

#[tokio::test]
async fn weight_limit_is_enforced_like_people_limit() {
    let (_store, service, slot_id) = setup(10, Some(200)).await;

    let mut first = adult(slot_id, 1);
    first.holder_weight = Some(120);
    service.reserve(first).await.unwrap();

    let mut second = adult(slot_id, 2);
    second.holder_weight = Some(100);
    let err = service.reserve(second).await.unwrap_err();
    assert!(matches!(
        err,
        ReserveError::Capacity(CapacityError::Weight { requested: 100, available: 80 })
    ));

    let mut third = adult(slot_id, 3);
    third.holder_weight = Some(80);
    service.reserve(third).await.unwrap();
}

/* ---------- дубликаты и освобождение мест ---------- */

#[tokio::test]
async fn same_holder_cannot_book_one_slot_twice() {
    let (_store, service, slot_id) = setup(10, None).await;

    let a = {
        let service = service.clone();
        tokio::spawn(async move { service.reserve(adult(slot_id, 7)).await })
    };
    let b = {
        let service = service.clone();
        tokio::spawn(async move { service.reserve(adult(slot_id, 7)).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(ReserveError::DuplicateBooking)))
        .count();

    assert_eq!(succeeded, 1);
    assert_eq!(duplicates, 1);
}

#[tokio::test]
async fn cancellation_frees_capacity_immediately() {
    let (_store, service, slot_id) = setup(2, None).await;

    let booking = service.reserve(adult(slot_id, 1)).await.unwrap();
    service.reserve(adult(slot_id, 2)).await.unwrap();

    let err = service.reserve(adult(slot_id, 3)).await.unwrap_err();
    assert!(matches!(err, ReserveError::Capacity(CapacityError::People { .. })));

    assert!(service.cancel(booking.id).await.unwrap());

    // Освободившееся место сразу доступно следующей попытке
    service.reserve(adult(slot_id, 3)).await.unwrap();
    let occupancy = service.occupancy(slot_id).await.unwrap();
    assert_eq!(occupancy.people, 2);
}

#[tokio::test]
async fn cancel_is_terminal_and_reports_false_afterwards() {
    let (_store, service, slot_id) = setup(5, None).await;
    let booking = service.reserve(adult(slot_id, 1)).await.unwrap();

    assert!(service.cancel(booking.id).await.unwrap());
    assert!(!service.cancel(booking.id).await.unwrap());
    assert!(!service.cancel(9999).await.unwrap());
}

/* ---------- слоты ---------- */

#[tokio::test]
async fn reserve_rejects_missing_and_closed_slots() {
    let (store, service, slot_id) = setup(5, None).await;

    let err = service.reserve(adult(9999, 1)).await.unwrap_err();
    assert!(matches!(err, ReserveError::SlotNotFound));

    store.set_slot_status(slot_id, SlotStatus::Cancelled).await.unwrap();
    let err = service.reserve(adult(slot_id, 1)).await.unwrap_err();
    assert!(matches!(err, ReserveError::SlotClosed));
}

#[tokio::test]
async fn reserve_fails_busy_when_slot_lock_is_held() {
    let store = Arc::new(MemoryStore::with_lock_wait(Duration::from_millis(50)));
    let slot_id = make_slot(&store, 5, None, Window::hours(48)).await;
    // Без внутренних повторов, чтобы увидеть исход busy напрямую
    let service = ReservationService::new(store.clone(), 0);

    let guard = store.lock_slot(slot_id).await.unwrap();
    let err = service.reserve(adult(slot_id, 1)).await.unwrap_err();
    assert!(matches!(err, ReserveError::Busy));

    drop(guard);
    service.reserve(adult(slot_id, 1)).await.unwrap();
}

#[tokio::test]
async fn different_slots_do_not_contend() {
    let store = Arc::new(MemoryStore::with_lock_wait(Duration::from_millis(50)));
    let slot_a = make_slot(&store, 5, None, Window::hours(48)).await;
    let slot_b = make_slot(&store, 5, None, Window::hours(48)).await;
    let service = ReservationService::new(store.clone(), 0);

    // Удерживаемая блокировка слота A не мешает броням на слот B
    let _guard = store.lock_slot(slot_a).await.unwrap();
    service.reserve(adult(slot_b, 1)).await.unwrap();
}

/* ---------- промокоды ---------- */

async fn make_promo(
    store: &Arc<MemoryStore>,
    code: &str,
    discount: DiscountKind,
    value: i64,
    usage_limit: i32,
) {
    let now = Utc::now().naive_utc();
    store
        .create_promo(NewPromoCode {
            code: code.to_string(),
            discount,
            discount_value: value,
            valid_from: now - Window::hours(1),
            valid_until: now + Window::hours(1),
            usage_limit,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn promo_discount_applies_to_adult_and_children_total() {
    let (store, service, slot_id) = setup(10, None).await;
    make_promo(&store, "SEA10", DiscountKind::Percent, 10, 5).await;

    let mut req = adult(slot_id, 1);
    req.children = vec![child("8-12", 500, None)];
    req.promo_code = Some("SEA10".to_string());

    // (2000 + 500) * 90 / 100
    let booking = service.reserve(req).await.unwrap();
    assert_eq!(booking.total_price, 2250);

    let promo = store.promo_by_code("SEA10").await.unwrap().unwrap();
    assert_eq!(promo.usage_count, 1);
    assert_eq!(booking.promo_code_id, Some(promo.id));
}

#[tokio::test]
async fn fixed_promo_never_drops_price_below_zero() {
    let (store, service, slot_id) = setup(10, None).await;
    make_promo(&store, "MINUS9000", DiscountKind::Fixed, 9000, 5).await;

    let mut req = adult(slot_id, 1);
    req.promo_code = Some("MINUS9000".to_string());
    let booking = service.reserve(req).await.unwrap();
    assert_eq!(booking.total_price, 0);
}

#[tokio::test]
async fn promo_window_and_lookup_rejections() {
    let (store, service, slot_id) = setup(10, None).await;
    let now = Utc::now().naive_utc();

    store
        .create_promo(NewPromoCode {
            code: "LATER".to_string(),
            discount: DiscountKind::Percent,
            discount_value: 10,
            valid_from: now + Window::hours(1),
            valid_until: now + Window::hours(2),
            usage_limit: 5,
        })
        .await
        .unwrap();
    store
        .create_promo(NewPromoCode {
            code: "BYGONE".to_string(),
            discount: DiscountKind::Percent,
            discount_value: 10,
            valid_from: now - Window::hours(2),
            valid_until: now - Window::hours(1),
            usage_limit: 5,
        })
        .await
        .unwrap();

    let mut req = adult(slot_id, 1);
    req.promo_code = Some("NOSUCH".to_string());
    assert!(matches!(
        service.reserve(req).await.unwrap_err(),
        ReserveError::Promo(PromoError::NotFound)
    ));

    let mut req = adult(slot_id, 1);
    req.promo_code = Some("LATER".to_string());
    assert!(matches!(
        service.reserve(req).await.unwrap_err(),
        ReserveError::Promo(PromoError::NotYetValid)
    ));

    let mut req = adult(slot_id, 1);
    req.promo_code = Some("BYGONE".to_string());
    assert!(matches!(
        service.reserve(req).await.unwrap_err(),
        ReserveError::Promo(PromoError::Expired)
    ));

    // Ни одна из отклонённых попыток не заняла место
    assert_eq!(service.occupancy(slot_id).await.unwrap().people, 0);
}

#[tokio::test]
async fn promo_with_single_use_is_not_oversold_concurrently() {
    let (store, service, slot_id) = setup(10, None).await;
    make_promo(&store, "ONCE", DiscountKind::Percent, 50, 1).await;

    let tasks: Vec<_> = (1..=2)
        .map(|holder_id| {
            let service = service.clone();
            tokio::spawn(async move {
                let mut req = adult(slot_id, holder_id);
                req.promo_code = Some("ONCE".to_string());
                service.reserve(req).await
            })
        })
        .collect();

    let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();
    let succeeded: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let exhausted = results
        .iter()
        .filter(|r| matches!(r, Err(ReserveError::Promo(PromoError::UsageExhausted))))
        .count();

    assert_eq!(succeeded.len(), 1);
    assert_eq!(exhausted, 1);
    assert_eq!(succeeded[0].total_price, 1000);

    let promo = store.promo_by_code("ONCE").await.unwrap().unwrap();
    assert_eq!(promo.usage_count, 1);
}

#[tokio::test]
async fn abandoned_transaction_rolls_back_promo_usage() {
    let (store, _service, slot_id) = setup(10, None).await;
    make_promo(&store, "ROLLBACK", DiscountKind::Percent, 10, 1).await;
    let promo = store.promo_by_code("ROLLBACK").await.unwrap().unwrap();

    {
        let mut guard = store.lock_slot(slot_id).await.unwrap();
        assert!(guard.redeem_promo(promo.id).await.unwrap());
        // Транзакция брошена без commit
    }

    let promo = store.promo_by_code("ROLLBACK").await.unwrap().unwrap();
    assert_eq!(promo.usage_count, 0);
}

/* ---------- оси статуса ---------- */

#[tokio::test]
async fn status_axes_are_updated_independently() {
    let (store, service, slot_id) = setup(5, None).await;
    let lifecycle = LifecycleService::new(store.clone());
    let booking = service.reserve(adult(slot_id, 1)).await.unwrap();

    assert!(lifecycle
        .update_status(booking.id, None, Some(PaymentStatus::Paid))
        .await
        .unwrap());
    let stored = store.booking_by_id(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.client_status, ClientStatus::NotArrived);
    assert_eq!(stored.booking_status, BookingStatus::Active);

    assert!(lifecycle
        .update_status(booking.id, Some(ClientStatus::Arrived), None)
        .await
        .unwrap());
    let stored = store.booking_by_id(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.client_status, ClientStatus::Arrived);
    assert_eq!(stored.payment_status, PaymentStatus::Paid);

    // Явку можно откатить - ошибочную отметку исправляют
    assert!(lifecycle
        .update_status(booking.id, Some(ClientStatus::NotArrived), None)
        .await
        .unwrap());
    let stored = store.booking_by_id(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.client_status, ClientStatus::NotArrived);
}

#[tokio::test]
async fn empty_and_misdirected_status_updates_return_false() {
    let (store, service, slot_id) = setup(5, None).await;
    let lifecycle = LifecycleService::new(store.clone());
    let booking = service.reserve(adult(slot_id, 1)).await.unwrap();

    // Нет полей - нет записи
    assert!(!lifecycle.update_status(booking.id, None, None).await.unwrap());
    let stored = store.booking_by_id(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::NotPaid);
    assert_eq!(stored.client_status, ClientStatus::NotArrived);

    // Несуществующая бронь
    assert!(!lifecycle
        .update_status(9999, Some(ClientStatus::Arrived), None)
        .await
        .unwrap());

    // Отменённая бронь закрыта для любых переходов
    assert!(service.cancel(booking.id).await.unwrap());
    assert!(!lifecycle
        .update_status(booking.id, None, Some(PaymentStatus::Paid))
        .await
        .unwrap());
    let stored = store.booking_by_id(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::NotPaid);
}

/* ---------- окно напоминаний ---------- */

#[tokio::test]
async fn reminder_window_selects_only_upcoming_paid_active_bookings() {
    let store = Arc::new(MemoryStore::new());
    let service = ReservationService::new(store.clone(), 3);
    let lifecycle = LifecycleService::new(store.clone());
    let reminders = ReminderService::new(store.clone());

    let in_23h = make_slot(&store, 10, None, Window::hours(23)).await;
    let in_24h = make_slot(&store, 10, None, Window::hours(24)).await;
    let in_25h = make_slot(&store, 10, None, Window::hours(25)).await;
    let hour_ago = make_slot(&store, 10, None, Window::hours(-1)).await;

    let mut paid_ids = Vec::new();
    for slot_id in [in_23h, in_24h, in_25h, hour_ago] {
        let booking = service.reserve(adult(slot_id, slot_id)).await.unwrap();
        assert!(lifecycle
            .update_status(booking.id, None, Some(PaymentStatus::Paid))
            .await
            .unwrap());
        paid_ids.push((slot_id, booking.id));
    }

    // Неоплаченная и отменённая брони в окне не участвуют
    let unpaid = service.reserve(adult(in_23h, 777)).await.unwrap();
    let cancelled = service.reserve(adult(in_24h, 888)).await.unwrap();
    assert!(lifecycle
        .update_status(cancelled.id, None, Some(PaymentStatus::Paid))
        .await
        .unwrap());
    assert!(service.cancel(cancelled.id).await.unwrap());

    let entries = reminders.upcoming_for_reminder(24).await.unwrap();
    let ids: Vec<i64> = entries.iter().map(|e| e.booking_id).collect();

    let expected: Vec<i64> = paid_ids
        .iter()
        .filter(|(slot_id, _)| *slot_id == in_23h || *slot_id == in_24h)
        .map(|(_, booking_id)| *booking_id)
        .collect();
    assert_eq!(ids, expected);
    assert!(!ids.contains(&unpaid.id));

    // Порядок стабильный: по времени старта, затем по id брони
    let mut sorted = entries.clone();
    sorted.sort_by_key(|e| (e.start_time, e.booking_id));
    assert_eq!(
        entries.iter().map(|e| e.booking_id).collect::<Vec<_>>(),
        sorted.iter().map(|e| e.booking_id).collect::<Vec<_>>()
    );
}

/* ---------- сквозной сценарий ---------- */

#[tokio::test]
async fn occupancy_scenario_with_children_and_weights() {
    let (store, service, slot_id) = setup(10, None).await;

    let mut booking_a = adult(slot_id, 1);
    booking_a.holder_weight = Some(80);
    booking_a.children = vec![child("8-12", 500, Some(30))];
    let a = service.reserve(booking_a).await.unwrap();

    let occupancy = service.occupancy(slot_id).await.unwrap();
    assert_eq!((occupancy.people, occupancy.weight), (2, 110));

    service.reserve(adult(slot_id, 2)).await.unwrap();
    let occupancy = service.occupancy(slot_id).await.unwrap();
    assert_eq!((occupancy.people, occupancy.weight), (3, 110));

    let children = store.booking_children(a.id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].age_category, "8-12");
    assert_eq!(children[0].price, 500);
    assert_eq!(a.total_price, ADULT_PRICE + 500);
}

//! promo.rs
//!
//! Проверка промокодов и расчёт скидки. Валидация чистая: момент времени
//! передаётся параметром. Само списание использования (инкремент
//! usage_count) делает хранилище атомарно со вставкой брони - здесь только
//! решение "подходит или нет" и арифметика цены.

use chrono::NaiveDateTime;

use crate::models::{DiscountKind, PromoCode};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PromoError {
    #[error("promo code not found")]
    NotFound,

    #[error("promo code is not valid yet")]
    NotYetValid,

    #[error("promo code has expired")]
    Expired,

    #[error("promo code usage limit reached")]
    UsageExhausted,
}

/// Код применим, если `valid_from <= at <= valid_until` (границы
/// включительно) и лимит использований не исчерпан.
pub fn validate(promo: &PromoCode, at: NaiveDateTime) -> Result<(), PromoError> {
    if at < promo.valid_from {
        return Err(PromoError::NotYetValid);
    }
    if at > promo.valid_until {
        return Err(PromoError::Expired);
    }
    if promo.usage_count >= promo.usage_limit {
        return Err(PromoError::UsageExhausted);
    }
    Ok(())
}

/// Цена после скидки в минимальных единицах валюты. Процентная скидка
/// округляется вниз целочисленным делением, фиксированная не уводит цену
/// ниже нуля.
pub fn apply(base_price: i64, promo: &PromoCode) -> i64 {
    match promo.discount {
        DiscountKind::Percent => {
            let value = promo.discount_value.clamp(0, 100);
            base_price * (100 - value) / 100
        }
        DiscountKind::Fixed => (base_price - promo.discount_value).max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;

    fn promo(discount: DiscountKind, value: i64) -> PromoCode {
        let now = Utc::now().naive_utc();
        PromoCode {
            id: 1,
            code: "SEA2025".to_string(),
            discount,
            discount_value: value,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            usage_limit: 10,
            usage_count: 0,
        }
    }

    #[test]
    fn valid_inside_window() {
        let p = promo(DiscountKind::Percent, 10);
        assert_eq!(validate(&p, Utc::now().naive_utc()), Ok(()));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let p = promo(DiscountKind::Percent, 10);
        assert_eq!(validate(&p, p.valid_from), Ok(()));
        assert_eq!(validate(&p, p.valid_until), Ok(()));
    }

    #[test]
    fn rejected_before_window() {
        let p = promo(DiscountKind::Percent, 10);
        let at = p.valid_from - Duration::seconds(1);
        assert_eq!(validate(&p, at), Err(PromoError::NotYetValid));
    }

    #[test]
    fn rejected_after_window() {
        let p = promo(DiscountKind::Percent, 10);
        let at = p.valid_until + Duration::seconds(1);
        assert_eq!(validate(&p, at), Err(PromoError::Expired));
    }

    #[test]
    fn rejected_when_exhausted() {
        let mut p = promo(DiscountKind::Percent, 10);
        p.usage_count = p.usage_limit;
        assert_eq!(
            validate(&p, Utc::now().naive_utc()),
            Err(PromoError::UsageExhausted)
        );
    }

    #[test]
    fn percent_discount_floors_to_minimal_unit() {
        // 15% от 999: 999 * 85 / 100 = 849.15 -> 849
        assert_eq!(apply(999, &promo(DiscountKind::Percent, 15)), 849);
        assert_eq!(apply(1000, &promo(DiscountKind::Percent, 100)), 0);
        assert_eq!(apply(1000, &promo(DiscountKind::Percent, 0)), 1000);
    }

    #[test]
    fn fixed_discount_clamps_at_zero() {
        assert_eq!(apply(500, &promo(DiscountKind::Fixed, 200)), 300);
        assert_eq!(apply(500, &promo(DiscountKind::Fixed, 700)), 0);
    }

    proptest! {
        #[test]
        fn percent_discount_stays_within_bounds(
            base in 0i64..=10_000_000,
            value in 0i64..=100,
        ) {
            let discounted = apply(base, &promo(DiscountKind::Percent, value));
            prop_assert!(discounted >= 0);
            prop_assert!(discounted <= base);
        }

        #[test]
        fn fixed_discount_stays_within_bounds(
            base in 0i64..=10_000_000,
            value in 0i64..=20_000_000,
        ) {
            let discounted = apply(base, &promo(DiscountKind::Fixed, value));
            prop_assert!(discounted >= 0);
            prop_assert!(discounted <= base);
        }
    }
}

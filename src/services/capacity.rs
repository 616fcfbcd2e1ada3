//! capacity.rs
//!
//! Учёт вместимости слота. Занятость не хранится счётчиком, а каждый раз
//! выводится из живых активных броней - счётчику нечему "разъехаться".
//! Функции чистые: строки занятых мест им отдаёт хранилище, и при
//! бронировании это происходит внутри той же транзакции, что и запись.

use serde::Serialize;

use crate::models::Slot;
use crate::store::Occupant;

/// Текущая занятость слота: люди и суммарный заявленный вес.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub people: i64,
    pub weight: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CapacityError {
    #[error("not enough seats: requested {requested}, available {available}")]
    People { requested: i64, available: i64 },

    #[error("weight limit exceeded: requested {requested} kg, available {available} kg")]
    Weight { requested: i64, available: i64 },
}

/// Одна единица на каждого занятого (взрослый или ребёнок); вес без
/// заявленного значения считается нулём.
pub fn occupancy_of(occupants: &[Occupant]) -> Occupancy {
    Occupancy {
        people: occupants.len() as i64,
        weight: occupants
            .iter()
            .map(|o| i64::from(o.weight.unwrap_or(0)))
            .sum(),
    }
}

/// Проверка, что компания из `party_people` человек общим весом
/// `party_weight` помещается в слот поверх текущей занятости. Вес
/// проверяется только если у слота задан max_weight - тем же правилом,
/// что и места.
pub fn check_fit(
    slot: &Slot,
    current: Occupancy,
    party_people: i64,
    party_weight: i64,
) -> Result<(), CapacityError> {
    let seats_available = i64::from(slot.max_people) - current.people;
    if party_people > seats_available {
        return Err(CapacityError::People {
            requested: party_people,
            available: seats_available.max(0),
        });
    }

    if let Some(max_weight) = slot.max_weight {
        let weight_available = i64::from(max_weight) - current.weight;
        if party_weight > weight_available {
            return Err(CapacityError::Weight {
                requested: party_weight,
                available: weight_available.max(0),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SlotStatus;
    use chrono::Utc;

    fn slot(max_people: i32, max_weight: Option<i32>) -> Slot {
        Slot {
            id: 1,
            excursion_id: 1,
            start_time: Utc::now().naive_utc(),
            max_people,
            max_weight,
            captain_id: None,
            status: SlotStatus::Scheduled,
        }
    }

    fn occupants(weights: &[Option<i32>]) -> Vec<Occupant> {
        weights.iter().map(|&weight| Occupant { weight }).collect()
    }

    #[test]
    fn occupancy_counts_people_and_sums_weights() {
        let occ = occupancy_of(&occupants(&[Some(80), Some(30), None]));
        assert_eq!(occ, Occupancy { people: 3, weight: 110 });
    }

    #[test]
    fn empty_slot_has_zero_occupancy() {
        assert_eq!(occupancy_of(&[]), Occupancy::default());
    }

    #[test]
    fn exact_fit_is_allowed() {
        let current = Occupancy { people: 7, weight: 0 };
        assert!(check_fit(&slot(10, None), current, 3, 0).is_ok());
    }

    #[test]
    fn one_person_over_is_rejected() {
        let current = Occupancy { people: 7, weight: 0 };
        assert_eq!(
            check_fit(&slot(10, None), current, 4, 0),
            Err(CapacityError::People { requested: 4, available: 3 })
        );
    }

    #[test]
    fn weight_limit_is_checked_only_when_set() {
        let current = Occupancy { people: 1, weight: 700 };
        // Без лимита любой вес проходит
        assert!(check_fit(&slot(10, None), current, 1, 500).is_ok());
        // С лимитом - то же правило, что и для мест
        assert_eq!(
            check_fit(&slot(10, Some(800)), current, 1, 500),
            Err(CapacityError::Weight { requested: 500, available: 100 })
        );
        assert!(check_fit(&slot(10, Some(1200)), current, 1, 500).is_ok());
    }

    #[test]
    fn available_is_clamped_to_zero_in_errors() {
        let current = Occupancy { people: 12, weight: 0 };
        assert_eq!(
            check_fit(&slot(10, None), current, 1, 0),
            Err(CapacityError::People { requested: 1, available: 0 })
        );
    }
}

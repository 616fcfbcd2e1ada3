pub mod capacity;
pub mod lifecycle;
pub mod promo;
pub mod reminder;
pub mod reservation;

pub use capacity::{CapacityError, Occupancy};
pub use lifecycle::LifecycleService;
pub use promo::PromoError;
pub use reminder::ReminderService;
pub use reservation::{ChildRequest, ReservationService, ReserveError, ReserveRequest};

pub mod excursion;
pub mod slot;
pub mod booking;
pub mod promo;

pub use excursion::{Excursion, NewExcursion};
pub use slot::{NewSlot, Slot, SlotStatus};
pub use booking::{
    Booking, BookingChild, BookingStatus, ClientStatus, NewBooking, NewBookingChild,
    PaymentStatus,
};
pub use promo::{DiscountKind, NewPromoCode, PromoCode};

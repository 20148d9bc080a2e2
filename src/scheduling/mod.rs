//! Appointment and waitlist booking.

mod appointments;
mod types;
mod waitlist;

pub use appointments::AppointmentBook;
pub use types::{
    Appointment, AppointmentAction, AppointmentSlot, AppointmentStatus, NewAppointment,
    NewWaitlistEntry, NoShowRisk, Priority, WaitlistAction, WaitlistCriteria, WaitlistEntry,
    WaitlistStatus,
};
pub use waitlist::{Booking, WaitlistManager};

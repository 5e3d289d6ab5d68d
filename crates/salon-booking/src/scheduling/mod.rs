//! Scheduling rules: slot planning and the appointment status machine.

pub mod lifecycle;
pub mod slot_generator;

pub use lifecycle::{slot_effect, AppointmentStatus, SlotEffect, TransitionPolicy};
pub use slot_generator::{plan_slots, OperatingHours, SlotWindow};

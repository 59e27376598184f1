//! Attendance evaluation: geofencing, face verification, the period schedule
//! and the per-day state machine, tied together by [`AttendanceService`].

pub mod clock;
pub mod error;
pub mod face;
pub mod geo;
pub mod location;
pub mod schedule;
pub mod service;
pub mod session;
pub mod state;
pub mod summary;

pub use error::{AttendanceError, Decline};
pub use service::{AttendanceEvent, AttendanceEventKind, AttendanceService};

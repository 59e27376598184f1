pub mod attendance;
pub mod geo;
pub mod period;
pub mod role;
pub mod user;

pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod routing;
pub mod time_model;

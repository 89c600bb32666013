pub mod alerts;
pub mod throttle;

pub mod broadcaster;
pub mod config;
pub mod registry;
pub mod scheduler;
pub mod simulator;
pub mod sites;

pub mod api;
pub mod config;
pub mod platform;
pub mod schedule;
pub mod state;

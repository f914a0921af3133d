pub mod core;
pub mod http;
pub mod player;
pub mod server;
pub mod store;

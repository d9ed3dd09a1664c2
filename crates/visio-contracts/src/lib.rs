pub mod chat;
pub mod config;
pub mod events;
pub mod models;
pub mod preview;
pub mod quota;
pub mod store;
pub mod suggest;

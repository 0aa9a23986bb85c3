pub mod app_state;
pub mod collection_ops;
pub mod config;
pub mod database;
pub mod enums;
pub mod errors;
pub mod models;
pub mod utils;

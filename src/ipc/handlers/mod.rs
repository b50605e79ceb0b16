pub mod config;
pub mod core;
pub mod datasets;
pub mod reports;

pub mod app_state;
pub mod config;
pub mod shutdown;
pub mod startup;

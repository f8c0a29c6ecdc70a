pub mod app_state;
pub mod config;
pub mod cors;
pub mod jobs;
pub mod middleware;
pub mod startup;

pub mod config;
pub mod song;
pub mod theory;
pub mod tuning;

pub mod chart;
pub mod config;
pub mod console_display;
pub mod coordinator;
pub mod judge;
pub mod motion;
pub mod note;
pub mod scheduler;
pub mod score;
pub mod session;
pub mod session_log;
pub mod simulator;
pub mod telemetry;
pub mod types;

pub mod api;
pub mod config;
pub mod orchestrator;
pub mod pipeline;
pub mod providers;

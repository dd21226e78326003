pub mod app;
pub mod bootstrap;
pub mod chart;
pub mod config;
pub mod error;
pub mod fallback;
pub mod handlers;
pub mod history;
pub mod persist;
pub mod probe;
pub mod resolve;
pub mod sampler;
pub mod server;
pub mod snapshot;
pub mod state;
pub mod telemetry;

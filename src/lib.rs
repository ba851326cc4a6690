pub mod app;
pub mod config;
pub mod delivery;
pub mod provider;
pub mod queue;
pub mod runtime;
pub mod shared;

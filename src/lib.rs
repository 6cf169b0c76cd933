pub mod api;
pub mod comments;
pub mod config;
pub mod engine;
pub mod execution;
pub mod platform;
pub mod targets;
pub mod vault;

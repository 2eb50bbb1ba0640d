pub mod agent;
pub mod api;
pub mod config;
pub mod coordinator;
pub mod dom;
pub mod error;
pub mod extract;
pub mod frame;
pub mod host;
pub mod models;
pub mod replay;
pub mod store;

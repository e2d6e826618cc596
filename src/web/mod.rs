//! HTTP API over the engine, one thin Axum layer.

pub mod api;
pub mod models;

//! Driveboard host: serial protocol engine and declarative job
//! translator for CNC laser hardware, with a thin HTTP control API.

pub mod config;
pub mod engine;
pub mod job;
pub mod protocol;
pub mod web;

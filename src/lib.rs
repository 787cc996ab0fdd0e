//! Tollgate - Quota-Enforcing API Gateway
//!
//! This crate implements an HTTP gateway that protects a backend API with a
//! per-client fixed-window request quota. Window state lives in a shared
//! external store (Redis) so the quota holds across multiple gateway
//! processes.

pub mod config;
pub mod error;
pub mod fixtures;
pub mod http;
pub mod quota;
pub mod store;

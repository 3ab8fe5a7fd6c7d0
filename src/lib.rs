//! # gaekit
//!
//! Google login and App Engine runtime helpers for axum services: the
//! OAuth2 login/callback pair, server-side sessions, an execution
//! environment classifier and a guard for task and cron endpoints.

pub mod config;
pub mod environment;
pub mod error;
pub mod googleauth;
pub mod handlers;
pub mod models;
pub mod server;
pub mod session;
pub mod telemetry;

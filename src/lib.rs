//! Portfolio Shield
//!
//! Request protection for a personal portfolio site: security headers,
//! suspicious activity detection and contact-form rate limiting.

pub mod api;
pub mod config;
pub mod core;
pub mod models;
pub mod utils;

//! opsctl core library
//!
//! This library provides the backend supervisor building blocks:
//! - HTTP probing and health monitoring
//! - Port and process inspection
//! - Process lifecycle control with ownership gating
//! - Deep-learning job orchestration
//! - Diagnostic classification, reports, and tickets
//!
//! The binary entry point is in `main.rs`.

pub mod config;
pub mod doctor;
pub mod exit_codes;
pub mod health;
pub mod inspect;
pub mod job;
pub mod lifecycle;
pub mod logging;
pub mod probe;
pub mod report;

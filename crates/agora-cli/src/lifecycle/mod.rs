//! Lifecycle management for the supervised daemon.
//!
//! This module is split into focused submodules so each concern remains
//! small and testable:
//! - [`types`] defines the shared context and IO helpers.
//! - [`error`] captures the error surface exposed to the CLI.
//! - [`spawning`] launches the resident supervision service.
//! - [`monitoring`] provides health snapshot polling and PID reading.
//! - [`shutdown`] manages service termination and shutdown waiting.
//! - [`controller`] implements the high-level start/stop/status flows.

mod controller;
mod error;
mod monitoring;
mod shutdown;
mod spawning;
mod types;

pub(crate) use controller::SystemLifecycle;
pub(crate) use error::LifecycleError;
pub(crate) use types::{LifecycleContext, LifecycleOutput};

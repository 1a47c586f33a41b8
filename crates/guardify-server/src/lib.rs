//! # guardify-server
//!
//! HTTP server library for guardify.
//!
//! Wraps a [`guardify_core::Tracker`] in a REST API: tracking sessions,
//! buzzer control, tracked objects and alert history.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;

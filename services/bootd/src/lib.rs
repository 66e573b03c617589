//! osboot boot server library.
//!
//! This crate primarily ships a `bootd` binary, but exposes its pieces so the
//! router can be exercised in integration tests.

pub mod api;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod rescan;
pub mod state;
pub mod urls;

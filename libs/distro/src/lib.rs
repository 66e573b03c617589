//! Distribution detection and boot scripts.
//!
//! A [`DetectionCascade`] tries every registered [`DistroKind`] against a
//! [`Tree`](osboot_tree::Tree), most specific kind first. The winner is bound
//! to the tree as a [`Distro`], which reads its metadata lazily and renders an
//! iPXE script pointing back at the tree's files.
//!
//! ```text
//! debian ─┬─ debian-live
//!         └─ ubuntu ─┬─ ubuntu-netboot
//!                    └─ ubuntu-live
//! redhat
//! ```
//!
//! # Invariants
//!
//! - Detection is a pure function of the tree's contents
//! - A kind is always tried before its parent
//! - Metadata is read at most once per [`Distro`]

mod cascade;
mod debian;
mod error;
mod kind;
pub mod manifest;
mod redhat;
mod ubuntu;

pub use cascade::{standard_kinds, DetectionCascade};
pub use debian::{Debian, DebianLive};
pub use error::DistroError;
pub use kind::{BootScript, Distro, DistroKind, UrlBuilder};
pub use manifest::Manifest;
pub use redhat::RedHat;
pub use ubuntu::{Ubuntu, UbuntuLive, UbuntuNetboot};

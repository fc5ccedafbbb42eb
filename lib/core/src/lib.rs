//! Core domain types for the cadenza trigger library.
//!
//! This crate provides the strongly-typed identifiers shared by the
//! trigger crates. The scheduling primitives themselves live in
//! `cadenza-trigger`.

pub mod id;

pub use id::{ParseIdError, TriggerId};

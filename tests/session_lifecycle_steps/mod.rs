//! Step definitions for package session lifecycle scenarios.

mod given;
mod then;
mod when;
pub mod world;

//! `PostgreSQL` adapters for package session persistence.

mod models;
mod repository;
mod schema;

pub use repository::{PostgresSessionStore, SessionPgPool};

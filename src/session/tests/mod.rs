//! Unit tests for package sessions.

mod support;

//! Shared utilities and common types for the door access backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Bearer token verification
//! - Cursor pagination
//! - Bounded retry with exponential backoff
//! - Common validation logic

pub mod jwt;
pub mod pagination;
pub mod retry;
pub mod validation;

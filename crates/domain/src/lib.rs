//! Domain layer for the door access service.
//!
//! This crate contains:
//! - Domain models (Door, ProximityObservation, UnlockAttempt)
//! - The door registry and access decision engine
//! - Collaborator traits and in-memory implementations

pub mod models;
pub mod services;

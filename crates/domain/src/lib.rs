//! Domain layer for Phone Tracker.
//!
//! This crate contains:
//! - Domain models (Device, LocationSample, TrackingSession, SharingState)
//! - Collaborator traits (authorization)

pub mod models;
pub mod services;

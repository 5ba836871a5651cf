//! Shared utilities and common types for Phone Tracker.
//!
//! This crate provides common functionality used across all other crates:
//! - Phone number normalization and format validation
//! - Geographic range validation (latitude, longitude, accuracy, speed, bearing)

pub mod validation;

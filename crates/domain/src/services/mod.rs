//! Collaborator traits and their development implementations.

pub mod authorization;

pub use authorization::{Access, Authorization, StaticGrants};

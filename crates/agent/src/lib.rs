//! Phone Tracker agent.
//!
//! The runnable endpoint of the system: samples the device position in the
//! background, records it in the local registry (tracker role) or publishes
//! it to the remote share endpoint (companion role), and survives process
//! restarts through the persisted sharing state.

pub mod config;
pub mod controller;
pub mod logging;
pub mod provider;
pub mod publisher;
pub mod registry;
pub mod sampler;

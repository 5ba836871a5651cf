//! Domain models for Phone Tracker.

pub mod device;
pub mod location;
pub mod session;
pub mod sharing;

pub use device::{Device, RegisterDeviceRequest};
pub use location::{LocationReport, LocationReportAck, LocationSample};
pub use session::TrackingSession;
pub use sharing::SharingState;

#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod edges;
mod error;
mod identity;
mod memo;
mod node;
mod signal;
mod version;

pub use error::SignalError;
pub use identity::Identity;
pub use memo::Memo;
pub use signal::Signal;
pub use version::{TrackingVersion, ValueVersion};

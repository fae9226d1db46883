//! Resource limits enforced by the HTTP server

pub mod limits;

pub use limits::{
    ConnectionError, ConnectionGuard, ConnectionStats, ConnectionTracker, ResourceLimits,
    SizeError,
};

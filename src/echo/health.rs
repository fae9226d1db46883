use super::builder::iso_timestamp;
use super::context::ProcessContext;
use serde::Serialize;

pub const HEALTHY: &str = "healthy";

/// Liveness report, built fresh on every call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheckResponse {
    pub status: &'static str,
    pub timestamp: String,
    /// Seconds since process start
    pub uptime: f64,
}

pub fn build_health_status(context: &ProcessContext) -> HealthCheckResponse {
    HealthCheckResponse {
        status: HEALTHY,
        timestamp: iso_timestamp(),
        uptime: context.uptime(),
    }
}

//! Read-only process-level values shared by every request
//!
//! Captured once at startup and injected into the echo pipeline, so tests can
//! supply a fixed start time, hostname or environment.

use serde::Serialize;
use std::time::Instant;

/// Environment variable holding the deployment environment name
pub const ENVIRONMENT_VAR: &str = "APP_ENV";
/// Environment reported when none is configured
pub const DEFAULT_ENVIRONMENT: &str = "development";
/// Environment in which internal error messages are redacted
pub const PRODUCTION_ENVIRONMENT: &str = "production";
/// Source reference reported in `serviceInfo`
pub const SOURCE_CODE_URL: &str = "https://github.com/junjie-w/echo-service";

/// Where the deployment environment name comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentSource {
    /// A fixed value
    Fixed(String),
    /// Read from the named environment variable on every call
    Variable(String),
}

impl Default for EnvironmentSource {
    fn default() -> Self {
        Self::Variable(ENVIRONMENT_VAR.to_string())
    }
}

impl EnvironmentSource {
    pub fn resolve(&self) -> String {
        match self {
            Self::Fixed(value) => value.clone(),
            Self::Variable(name) => std::env::var(name)
                .ok()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
        }
    }
}

/// Host machine details reported with every echo
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub hostname: String,
    pub runtime_version: String,
}

/// Service details reported with every echo
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub source_code: String,
    pub version: String,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct ProcessContext {
    started_at: Instant,
    hostname: String,
    runtime_version: String,
    source_code: String,
    service_version: String,
    environment: EnvironmentSource,
}

impl ProcessContext {
    /// Creates a context with explicit values and the default environment source
    pub fn new(
        started_at: Instant,
        hostname: impl Into<String>,
        runtime_version: impl Into<String>,
    ) -> Self {
        Self {
            started_at,
            hostname: hostname.into(),
            runtime_version: runtime_version.into(),
            source_code: SOURCE_CODE_URL.to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: EnvironmentSource::default(),
        }
    }

    /// Captures the current process: now as start time, the machine hostname
    /// and this build's runtime version
    pub fn capture() -> Self {
        Self::new(Instant::now(), system_hostname(), runtime_version())
    }

    pub fn with_environment(mut self, environment: EnvironmentSource) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_source_code(mut self, source_code: impl Into<String>) -> Self {
        self.source_code = source_code.into();
        self
    }

    pub fn with_service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Seconds elapsed since the process started
    pub fn uptime(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Current deployment environment, resolved on every call
    pub fn environment(&self) -> String {
        self.environment.resolve()
    }

    pub fn is_production(&self) -> bool {
        self.environment() == PRODUCTION_ENVIRONMENT
    }

    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            hostname: self.hostname.clone(),
            runtime_version: self.runtime_version.clone(),
        }
    }

    pub fn service_info(&self) -> ServiceInfo {
        ServiceInfo {
            source_code: self.source_code.clone(),
            version: self.service_version.clone(),
            environment: self.environment(),
        }
    }
}

/// `<package>/<version> (<os>-<arch>)` of this build
pub fn runtime_version() -> String {
    format!(
        "{}/{} ({}-{})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Machine hostname, falling back to `$HOSTNAME` and then `localhost`
pub fn system_hostname() -> String {
    gethostname()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(unix)]
fn gethostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: the pointer and length describe a valid writable buffer.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..len].to_vec()).ok()
}

#[cfg(not(unix))]
fn gethostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}

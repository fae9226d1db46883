//! Request echo construction and execution timing
//!
//! The core of the service: it turns a [`RequestDescriptor`] into a
//! [`RequestEcho`], times that work and the surrounding response construction,
//! and reports health. It performs no I/O and never recovers from errors; the
//! HTTP layer translates failures into responses.

pub mod builder;
pub mod context;
pub mod health;
pub mod request;
pub mod response;
pub mod timing;

pub use builder::{HeaderValues, RequestEcho, build_request_echo};
pub use context::{EnvironmentSource, ProcessContext, ServerInfo, ServiceInfo};
pub use health::{HealthCheckResponse, build_health_status};
pub use request::RequestDescriptor;
pub use response::{EchoResponse, EchoResponseAssembler, EchoResponseData, TimedRequestEcho};
pub use timing::{ProcessingTime, TimedResult, measure_execution_time, try_measure_execution_time};

use super::builder::{RequestEcho, build_request_echo};
use super::context::{ProcessContext, ServerInfo, ServiceInfo};
use super::request::RequestDescriptor;
use super::timing::{ProcessingTime, try_measure_execution_time};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// A request echo together with the time it took to build
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedRequestEcho {
    #[serde(flatten)]
    pub echo: RequestEcho,
    pub processing_time: ProcessingTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoResponseData {
    pub request_echo: TimedRequestEcho,
    pub server: ServerInfo,
    pub service_info: ServiceInfo,
}

/// Full echo response body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoResponse {
    #[serde(flatten)]
    pub data: EchoResponseData,
    pub total_processing_time: ProcessingTime,
}

/// Builds the two-level timed echo response
///
/// The inner timer covers echo construction only; the outer timer covers the
/// whole response construction, so `total_processing_time` is never smaller
/// than the echo's own `processing_time`.
#[derive(Debug, Clone)]
pub struct EchoResponseAssembler {
    context: Arc<ProcessContext>,
}

impl EchoResponseAssembler {
    pub fn new(context: Arc<ProcessContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ProcessContext {
        &self.context
    }

    /// Builds the echo response for `request`
    ///
    /// Any failure is returned unchanged; nothing is partially built.
    pub fn build_timed_echo(&self, request: &RequestDescriptor) -> Result<EchoResponse> {
        let total = try_measure_execution_time(|| -> Result<EchoResponseData> {
            let echo = try_measure_execution_time(|| build_request_echo(request))?;

            Ok(EchoResponseData {
                request_echo: TimedRequestEcho {
                    echo: echo.data,
                    processing_time: echo.processing_time,
                },
                server: self.context.server_info(),
                service_info: self.context.service_info(),
            })
        })?;

        debug!(
            echo_ms = total.data.request_echo.processing_time.as_millis_f64(),
            total_ms = total.processing_time.as_millis_f64(),
            "Built timed echo"
        );

        Ok(EchoResponse {
            data: total.data,
            total_processing_time: total.processing_time,
        })
    }
}

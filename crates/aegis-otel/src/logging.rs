//! [`Logger`] backed by the `tracing` macros, so every log line also
//! flows through whatever subscriber the host process installed (see
//! [`crate::install_tracing_subscriber`] for the default one).

use aegis_core::observability::{LogContext, Logger};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }
}

impl Logger for TracingLogger {
    fn info(&self, message: &str, ctx: &LogContext) {
        tracing::info!(
            service = %ctx.service,
            instance_id = %ctx.instance_id,
            trace_id = ctx.trace_id.as_deref().unwrap_or(""),
            "{message}"
        );
    }

    fn warn(&self, message: &str, ctx: &LogContext) {
        tracing::warn!(
            service = %ctx.service,
            instance_id = %ctx.instance_id,
            trace_id = ctx.trace_id.as_deref().unwrap_or(""),
            "{message}"
        );
    }

    fn error(&self, message: &str, error_code: Option<&str>, ctx: &LogContext) {
        tracing::error!(
            service = %ctx.service,
            instance_id = %ctx.instance_id,
            trace_id = ctx.trace_id.as_deref().unwrap_or(""),
            error_code = error_code.unwrap_or(""),
            "{message}"
        );
    }
}

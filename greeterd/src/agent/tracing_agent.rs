use std::time::Instant;

use http::{HeaderMap, StatusCode};
use opentelemetry::trace::SpanContext;
use tracing::{
    debug,
    field::{display, Empty},
    info, info_span, warn, Span,
};

use super::{
    extract_remote_parent, Agent, AgentConfig, Transaction, TransportType, WebRequest,
    WebResponse, APP_NAME_KEY, NEWRELIC, TRACEPARENT,
};

/// Agent that reports transactions as `tracing` spans.
#[derive(Debug, Clone, Default)]
pub struct TracingAgent {
    config: AgentConfig,
}

impl TracingAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    fn app_name(&self) -> &str {
        self.config.get(APP_NAME_KEY).unwrap_or_default()
    }
}

impl Agent for TracingAgent {
    fn config_value(&self, key: &str) -> Option<String> {
        self.config.get(key).map(str::to_owned)
    }

    fn start_web_transaction(&self, name: &str) -> Box<dyn Transaction> {
        Box::new(TracingTransaction::web(name, self.app_name()))
    }

    fn start_background_transaction(&self, name: &str) -> Box<dyn Transaction> {
        Box::new(TracingTransaction::background(name, self.app_name()))
    }
}

#[derive(Debug)]
pub struct TracingTransaction {
    span: Span,
    started: Instant,
    remote_parent: Option<SpanContext>,
    status: Option<StatusCode>,
    error: Option<String>,
}

impl TracingTransaction {
    pub fn web(name: &str, app_name: &str) -> Self {
        Self::start(info_span!(
            "web_transaction",
            transaction.name = %name,
            app.name = %app_name,
            transport = Empty,
            http.method = Empty,
            url.path = Empty,
            http.status_code = Empty,
            trace.id = Empty,
            trace.parent_id = Empty,
            trace.sampled = Empty,
            trace.state = Empty,
            error = Empty,
        ))
    }

    pub fn background(name: &str, app_name: &str) -> Self {
        Self::start(info_span!(
            "background_transaction",
            transaction.name = %name,
            app.name = %app_name,
            transport = Empty,
            trace.id = Empty,
            trace.parent_id = Empty,
            trace.sampled = Empty,
            trace.state = Empty,
            error = Empty,
        ))
    }

    fn start(span: Span) -> Self {
        Self {
            span,
            started: Instant::now(),
            remote_parent: None,
            status: None,
            error: None,
        }
    }

    /// Caller's span context, once accepted.
    pub fn remote_parent(&self) -> Option<&SpanContext> {
        self.remote_parent.as_ref()
    }

    /// `tracestate` accepted along with the caller's `traceparent`.
    pub fn trace_state(&self) -> Option<String> {
        self.remote_parent
            .as_ref()
            .map(|parent| parent.trace_state().header())
            .filter(|state| !state.is_empty())
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl Transaction for TracingTransaction {
    fn accept_distributed_trace_headers(
        &mut self,
        transport_type: TransportType,
        headers: &HeaderMap,
    ) {
        self.span.record("transport", transport_type.as_str());

        match extract_remote_parent(headers) {
            Some(parent) => {
                self.span.record("trace.id", display(parent.trace_id()));
                self.span.record("trace.parent_id", display(parent.span_id()));
                self.span.record("trace.sampled", parent.is_sampled());
                let state = parent.trace_state().header();
                if !state.is_empty() {
                    self.span.record("trace.state", state.as_str());
                }
                self.remote_parent = Some(parent);
            }
            None => {
                if let Some(raw) = headers.get(TRACEPARENT) {
                    warn!(parent: &self.span, traceparent = ?raw, "Ignoring invalid traceparent");
                }
            }
        }

        if headers.contains_key(NEWRELIC) {
            debug!(parent: &self.span, "Received agent distributed trace payload");
        }
    }

    fn set_web_request(&mut self, request: &dyn WebRequest) {
        self.span.record("http.method", request.method().as_str());
        self.span.record("url.path", request.uri().path());
    }

    fn set_web_response(&mut self, response: &dyn WebResponse) {
        let status = response.status();
        self.span.record("http.status_code", status.as_u16());
        self.status = Some(status);
    }

    fn notice_error(&mut self, message: &str) {
        self.span.record("error", message);
        self.error = Some(message.to_owned());
    }

    fn span(&self) -> Span {
        self.span.clone()
    }

    fn end(self: Box<Self>) {
        info!(
            parent: &self.span,
            elapsed = ?self.started.elapsed(),
            status = self.status.map(|s| s.as_u16()),
            "Transaction ended"
        );
    }
}

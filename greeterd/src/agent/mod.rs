//! Interface to the application-performance-monitoring agent.
//!
//! The handler never reaches for a process-wide agent. An [`Agent`] is built
//! once at startup and handed to whatever needs it, so tests and deployments
//! without monitoring can plug in [`NoopAgent`].

use std::fmt;

use http::{HeaderMap, Method, StatusCode, Uri};
use tracing::Span;

mod config;
mod propagation;
mod tracing_agent;

pub use config::AgentConfig;
pub use propagation::{extract_remote_parent, TRACEPARENT, TRACESTATE};
pub use tracing_agent::{TracingAgent, TracingTransaction};

/// Header carrying the agent's own distributed trace payload.
pub const NEWRELIC: &str = "newrelic";

pub const APP_NAME_KEY: &str = "newrelic.config.app_name";
pub const LICENSE_KEY_KEY: &str = "newrelic.config.license_key";

pub trait Agent: Send + Sync + fmt::Debug {
    /// Reads an agent setting, e.g. `newrelic.config.app_name`.
    fn config_value(&self, key: &str) -> Option<String>;

    fn start_web_transaction(&self, name: &str) -> Box<dyn Transaction>;

    /// Starts a transaction for work not driven by an HTTP exchange.
    fn start_background_transaction(&self, name: &str) -> Box<dyn Transaction>;
}

/// One unit of work reported to the agent.
pub trait Transaction: Send {
    /// Links this transaction to the caller's trace, if the headers carry one.
    fn accept_distributed_trace_headers(
        &mut self,
        transport_type: TransportType,
        headers: &HeaderMap,
    );

    fn set_web_request(&mut self, request: &dyn WebRequest);

    fn set_web_response(&mut self, response: &dyn WebResponse);

    fn notice_error(&mut self, message: &str);

    /// Span the transaction's work should run in.
    fn span(&self) -> Span {
        Span::none()
    }

    fn end(self: Box<Self>);
}

/// What the agent needs to know about an inbound request.
pub trait WebRequest {
    fn method(&self) -> &Method;
    fn uri(&self) -> &Uri;
    fn header(&self, name: &str) -> Option<&str>;
    fn transport_type(&self) -> TransportType;
}

/// What the agent needs to know about the response sent back.
pub trait WebResponse {
    fn status(&self) -> StatusCode;
    fn header(&self, name: &str) -> Option<&str>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    Http,
    Https,
    Unknown,
}

impl TransportType {
    pub fn from_scheme(scheme: &str) -> Self {
        if scheme.eq_ignore_ascii_case("https") {
            Self::Https
        } else if scheme.eq_ignore_ascii_case("http") {
            Self::Http
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent used when monitoring is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAgent;

impl Agent for NoopAgent {
    fn config_value(&self, _key: &str) -> Option<String> {
        None
    }

    fn start_web_transaction(&self, _name: &str) -> Box<dyn Transaction> {
        Box::new(NoopTransaction)
    }

    fn start_background_transaction(&self, _name: &str) -> Box<dyn Transaction> {
        Box::new(NoopTransaction)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransaction;

impl Transaction for NoopTransaction {
    fn accept_distributed_trace_headers(&mut self, _: TransportType, _: &HeaderMap) {}

    fn set_web_request(&mut self, _: &dyn WebRequest) {}

    fn set_web_response(&mut self, _: &dyn WebResponse) {}

    fn notice_error(&mut self, _: &str) {}

    fn end(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_type_from_scheme() {
        assert_eq!(TransportType::from_scheme("https"), TransportType::Https);
        assert_eq!(TransportType::from_scheme("HTTP"), TransportType::Http);
        assert_eq!(TransportType::from_scheme("ws"), TransportType::Unknown);
        assert_eq!(TransportType::Https.to_string(), "HTTPS");
    }

    #[test]
    fn noop_agent_has_no_config() {
        let agent = NoopAgent;
        assert_eq!(agent.config_value(APP_NAME_KEY), None);

        let mut transaction = agent.start_web_transaction("/fngreetings");
        transaction.accept_distributed_trace_headers(TransportType::Http, &HeaderMap::new());
        transaction.notice_error("ignored");
        assert!(transaction.span().is_none());
        transaction.end();

        let background = agent.start_background_transaction("nightly-cleanup");
        assert!(background.span().is_none());
        background.end();
    }
}

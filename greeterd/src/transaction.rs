//! Runs a handler as an agent transaction, web or background.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use common::{IncomingRequest, OutgoingResponse};
use http::{Method, StatusCode, Uri};
use tower::{Layer, Service};
use tracing::Instrument;

use crate::agent::{Agent, TransportType, WebRequest, WebResponse};

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Exposes an [`IncomingRequest`] to the agent.
#[derive(Debug, Clone, Copy)]
pub struct RequestAdapter<'a>(&'a IncomingRequest);

impl<'a> RequestAdapter<'a> {
    pub fn new(request: &'a IncomingRequest) -> Self {
        Self(request)
    }
}

impl WebRequest for RequestAdapter<'_> {
    fn method(&self) -> &Method {
        &self.0.method
    }

    fn uri(&self) -> &Uri {
        &self.0.uri
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.0.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// `x-forwarded-proto` wins over the URI scheme.
    fn transport_type(&self) -> TransportType {
        self.header(X_FORWARDED_PROTO)
            .or_else(|| self.0.uri.scheme_str())
            .map_or(TransportType::Http, TransportType::from_scheme)
    }
}

/// Exposes an [`OutgoingResponse`] to the agent.
#[derive(Debug, Clone, Copy)]
pub struct ResponseAdapter<'a>(&'a OutgoingResponse);

impl<'a> ResponseAdapter<'a> {
    pub fn new(response: &'a OutgoingResponse) -> Self {
        Self(response)
    }
}

impl WebResponse for ResponseAdapter<'_> {
    fn status(&self) -> StatusCode {
        self.0.status
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.0.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Debug, Clone)]
pub struct WebTransactionLayer {
    agent: Arc<dyn Agent>,
    name: Arc<str>,
}

impl WebTransactionLayer {
    pub fn new(agent: Arc<dyn Agent>, name: impl Into<Arc<str>>) -> Self {
        Self {
            agent,
            name: name.into(),
        }
    }
}

impl<S> Layer<S> for WebTransactionLayer {
    type Service = WebTransactionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        WebTransactionService {
            inner,
            agent: self.agent.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebTransactionService<S> {
    inner: S,
    agent: Arc<dyn Agent>,
    name: Arc<str>,
}

impl<S> Service<IncomingRequest> for WebTransactionService<S>
where
    S: Service<IncomingRequest, Response = OutgoingResponse>,
    S::Error: fmt::Display,
    S::Future: Send + 'static,
{
    type Response = OutgoingResponse;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: IncomingRequest) -> Self::Future {
        let mut transaction = self.agent.start_web_transaction(&self.name);
        {
            let adapter = RequestAdapter::new(&request);
            transaction
                .accept_distributed_trace_headers(adapter.transport_type(), &request.headers);
            transaction.set_web_request(&adapter);
        }

        let span = transaction.span();
        let future = {
            let _guard = span.enter();
            self.inner.call(request)
        };

        Box::pin(
            async move {
                let result = future.await;
                match &result {
                    Ok(response) => transaction.set_web_response(&ResponseAdapter::new(response)),
                    Err(err) => transaction.notice_error(&err.to_string()),
                }
                transaction.end();
                result
            }
            .instrument(span),
        )
    }
}

/// Runs the inner service as a background transaction: trace headers are
/// still accepted, but no request or response details are reported.
#[derive(Debug, Clone)]
pub struct BackgroundTransactionLayer {
    agent: Arc<dyn Agent>,
    name: Arc<str>,
}

impl BackgroundTransactionLayer {
    pub fn new(agent: Arc<dyn Agent>, name: impl Into<Arc<str>>) -> Self {
        Self {
            agent,
            name: name.into(),
        }
    }
}

impl<S> Layer<S> for BackgroundTransactionLayer {
    type Service = BackgroundTransactionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BackgroundTransactionService {
            inner,
            agent: self.agent.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackgroundTransactionService<S> {
    inner: S,
    agent: Arc<dyn Agent>,
    name: Arc<str>,
}

impl<S> Service<IncomingRequest> for BackgroundTransactionService<S>
where
    S: Service<IncomingRequest>,
    S::Error: fmt::Display,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: IncomingRequest) -> Self::Future {
        let mut transaction = self.agent.start_background_transaction(&self.name);
        transaction.accept_distributed_trace_headers(
            RequestAdapter::new(&request).transport_type(),
            &request.headers,
        );

        let span = transaction.span();
        let future = {
            let _guard = span.enter();
            self.inner.call(request)
        };

        Box::pin(
            async move {
                let result = future.await;
                if let Err(err) = &result {
                    transaction.notice_error(&err.to_string());
                }
                transaction.end();
                result
            }
            .instrument(span),
        )
    }
}

use std::{convert::Infallible, future::Future, net::SocketAddr, pin::Pin};

use common::{IncomingRequest, OutgoingResponse};
use http::{header::ALLOW, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Bytes, Incoming},
    server::conn::http1,
    service,
};
use hyper_util::rt::TokioIo;
use regex::Regex;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tracing::{debug, error, info};

pub async fn run<S>(addr: SocketAddr, filters: Vec<Regex>, handler: S) -> anyhow::Result<()>
where
    S: tower::Service<IncomingRequest, Response = OutgoingResponse, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, filters, handler).await
}

/// Accepts connections forever, one task per connection.
pub async fn serve<S>(listener: TcpListener, filters: Vec<Regex>, handler: S) -> anyhow::Result<()>
where
    S: tower::Service<IncomingRequest, Response = OutgoingResponse, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    info!("Webserver listening on http://{}", listener.local_addr()?);

    let service = Service::new(filters, handler);
    loop {
        let (stream, remote) = listener.accept().await?;
        debug!("Accepted connection from {remote}");

        tokio::spawn({
            let service = service.clone();
            async move {
                if let Err(err) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    error!("Failed to serve connection: {err}");
                }
            }
        });
    }
}

#[derive(Debug, Clone)]
struct Service<S> {
    filters: Vec<Regex>,
    handler: S,
}

impl<S> Service<S> {
    fn new(filters: Vec<Regex>, handler: S) -> Self {
        Self { filters, handler }
    }
}

impl<S> service::Service<Request<Incoming>> for Service<S>
where
    S: tower::Service<IncomingRequest, Response = OutgoingResponse, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = Response<Full<Bytes>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        debug!("Received request {req:?}");

        // filter outside the future so filters aren't moved into it
        let handler = filter_req(&self.filters, req.uri().path()).then(|| self.handler.clone());

        Box::pin(async move {
            let Some(handler) = handler else {
                return Ok(Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Full::default())?);
            };

            if !is_allowed(req.method()) {
                return Ok(Response::builder()
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .header(ALLOW, HeaderValue::from_static("GET, POST"))
                    .body(Full::default())?);
            }

            let (head, body) = req.into_parts();

            let request = IncomingRequest {
                method: head.method,
                uri: head.uri,
                headers: head.headers,
                body: body.collect().await?.to_bytes(),
            };

            let response = match handler.oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            };

            let mut builder = Response::builder().status(response.status);
            if let Some(headers) = builder.headers_mut() {
                headers.extend(response.headers);
            }
            Ok(builder.body(Full::new(response.body))?)
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub enum Error {
    Http(#[from] http::Error),
    Hyper(#[from] hyper::Error),
}

fn filter_req(filters: &[Regex], path: &str) -> bool {
    filters.is_empty() || filters.iter().any(|regex| regex.is_match(path))
}

fn is_allowed(method: &Method) -> bool {
    *method == Method::GET || *method == Method::POST
}

/// Default route for a function, as assigned by the functions host.
pub fn function_route(function_name: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^/api/{}/?$", regex::escape(function_name)))
}

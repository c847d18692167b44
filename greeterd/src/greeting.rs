use std::{
    borrow::Cow,
    convert::Infallible,
    future::{ready, Ready},
    task::{Context, Poll},
};

use common::{IncomingRequest, OutgoingResponse};
use http::StatusCode;
use tracing::{debug, info};

pub const NAME_PARAM: &str = "name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Please pass a name on the query string or in the request body")]
pub struct MissingName;

impl From<MissingName> for OutgoingResponse {
    fn from(err: MissingName) -> Self {
        OutgoingResponse::text(StatusCode::BAD_REQUEST, err.to_string())
    }
}

/// Picks the name to greet: the body wins over the `name` query parameter.
/// A present but empty `name` parameter still counts as a name.
pub fn resolve_name(request: &IncomingRequest) -> Result<Cow<'_, str>, MissingName> {
    request
        .body_text()
        .or_else(|| request.query_param(NAME_PARAM))
        .ok_or(MissingName)
}

pub fn handle(request: &IncomingRequest) -> OutgoingResponse {
    match resolve_name(request) {
        Ok(name) => {
            debug!(%name, "Greeting");
            OutgoingResponse::text(StatusCode::OK, format!("Hello, {name}"))
        }
        Err(err) => {
            info!("{err}");
            err.into()
        }
    }
}

/// The greeting function as a tower service.
#[derive(Debug, Clone, Copy, Default)]
pub struct Greeting;

impl tower::Service<IncomingRequest> for Greeting {
    type Response = OutgoingResponse;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: IncomingRequest) -> Self::Future {
        ready(Ok(handle(&request)))
    }
}

use std::sync::Arc;

use tower::ServiceBuilder;

use crate::{
    agent::Agent,
    diagnostics::{Diagnostics, DiagnosticsLayer, DiagnosticsService},
    greeting::Greeting,
    transaction::{WebTransactionLayer, WebTransactionService},
};

pub mod agent;
pub mod diagnostics;
pub mod greeting;
pub mod transaction;
pub mod webserver;

pub type FunctionService = WebTransactionService<DiagnosticsService<Greeting>>;

/// The greeting function wrapped in an agent web transaction named
/// `/<function_name>`, with optional per-invocation diagnostics.
pub fn function_service(
    agent: Arc<dyn Agent>,
    function_name: &str,
    diagnostics: Option<Diagnostics>,
) -> FunctionService {
    ServiceBuilder::new()
        .layer(WebTransactionLayer::new(agent, format!("/{function_name}")))
        .layer(DiagnosticsLayer::new(diagnostics))
        .service(Greeting)
}

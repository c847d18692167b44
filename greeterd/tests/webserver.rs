use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use greeterd::{
    agent::{Agent, NoopAgent, Transaction, TransportType, WebRequest, WebResponse},
    function_service,
    webserver::{self, function_route},
};
use http::HeaderMap;
use reqwest::StatusCode;
use tokio::net::TcpListener;

const MISSING: &str = "Please pass a name on the query string or in the request body";
const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

async fn start(agent: Arc<dyn Agent>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let filters = vec![function_route("fngreetings").unwrap()];
    tokio::spawn(webserver::serve(
        listener,
        filters,
        function_service(agent, "fngreetings", None),
    ));
    addr
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

async fn text(response: reqwest::Response) -> (StatusCode, String) {
    let status = response.status();
    (status, response.text().await.unwrap())
}

#[tokio::test]
async fn greets_from_query() {
    let addr = start(Arc::new(NoopAgent)).await;
    let response = reqwest::get(url(addr, "/api/fngreetings?name=World")).await.unwrap();
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; charset=utf-8"
    );
    assert_eq!(text(response).await, (StatusCode::OK, "Hello, World".to_owned()));
}

#[tokio::test]
async fn empty_name_is_still_greeted() {
    let addr = start(Arc::new(NoopAgent)).await;
    let response = reqwest::get(url(addr, "/api/fngreetings?name=")).await.unwrap();
    assert_eq!(text(response).await, (StatusCode::OK, "Hello, ".to_owned()));
}

#[tokio::test]
async fn greets_from_body() {
    let addr = start(Arc::new(NoopAgent)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(url(addr, "/api/fngreetings"))
        .body("Ada")
        .send()
        .await
        .unwrap();
    assert_eq!(text(response).await, (StatusCode::OK, "Hello, Ada".to_owned()));

    let response = client
        .post(url(addr, "/api/fngreetings?name=Ignored"))
        .body("Override")
        .send()
        .await
        .unwrap();
    assert_eq!(text(response).await, (StatusCode::OK, "Hello, Override".to_owned()));
}

#[tokio::test]
async fn missing_name_is_bad_request() {
    let addr = start(Arc::new(NoopAgent)).await;
    let response = reqwest::get(url(addr, "/api/fngreetings")).await.unwrap();
    assert_eq!(text(response).await, (StatusCode::BAD_REQUEST, MISSING.to_owned()));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let addr = start(Arc::new(NoopAgent)).await;
    let response = reqwest::get(url(addr, "/api/other?name=World")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn other_methods_are_rejected() {
    let addr = start(Arc::new(NoopAgent)).await;
    let response = reqwest::Client::new()
        .put(url(addr, "/api/fngreetings?name=World"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()["allow"], "GET, POST");
}

#[derive(Debug, Default)]
struct TraceCapture {
    accepted: Arc<Mutex<Vec<(String, TransportType, Option<String>)>>>,
}

struct CaptureTransaction {
    name: String,
    accepted: Arc<Mutex<Vec<(String, TransportType, Option<String>)>>>,
}

impl Agent for TraceCapture {
    fn config_value(&self, _key: &str) -> Option<String> {
        None
    }

    fn start_web_transaction(&self, name: &str) -> Box<dyn Transaction> {
        Box::new(CaptureTransaction {
            name: name.to_owned(),
            accepted: self.accepted.clone(),
        })
    }

    fn start_background_transaction(&self, name: &str) -> Box<dyn Transaction> {
        self.start_web_transaction(name)
    }
}

impl Transaction for CaptureTransaction {
    fn accept_distributed_trace_headers(
        &mut self,
        transport_type: TransportType,
        headers: &HeaderMap,
    ) {
        let traceparent = headers
            .get("traceparent")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.accepted
            .lock()
            .unwrap()
            .push((self.name.clone(), transport_type, traceparent));
    }

    fn set_web_request(&mut self, _: &dyn WebRequest) {}

    fn set_web_response(&mut self, _: &dyn WebResponse) {}

    fn notice_error(&mut self, _: &str) {}

    fn end(self: Box<Self>) {}
}

#[tokio::test]
async fn forwards_trace_headers_to_agent() {
    let agent = Arc::new(TraceCapture::default());
    let addr = start(agent.clone()).await;

    let response = reqwest::Client::new()
        .get(url(addr, "/api/fngreetings?name=World"))
        .header("traceparent", TRACEPARENT)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let accepted = agent.accepted.lock().unwrap().clone();
    assert_eq!(
        accepted,
        vec![(
            "/fngreetings".to_owned(),
            TransportType::Http,
            Some(TRACEPARENT.to_owned())
        )]
    );
}

//! Long-poll exchanges parked in a registry and woken from another task.

use std::time::Duration;

use http::HeaderMap;
use tokio::time::Instant;

use gateway_adapter::protocol::{Message, Scope};
use gateway_adapter::{Dispatcher, HandlerResult, Request, WaitableRegistry};

mod common;
use common::{body_chunk, connect, CaptureReporter, Connection};

const POLL_TIMEOUT: Duration = Duration::from_secs(30);

fn long_poll(waiting: WaitableRegistry) -> (Dispatcher, CaptureReporter) {
    async fn handle(waiting: WaitableRegistry, req: Request) -> HandlerResult {
        let http = req.as_http().unwrap();
        waiting.add(http);
        http.accept_response(200, HeaderMap::new()).await?;
        let started = Instant::now();
        http.sleep_until(POLL_TIMEOUT).await?;
        let outcome = if started.elapsed() >= POLL_TIMEOUT { "timed out" } else { "woken" };
        http.send(outcome).await?;
        Ok(None)
    }
    let reporter = CaptureReporter::default();
    let dispatcher = Dispatcher::new(move |req: Request| handle(waiting.clone(), req)).with_reporter(reporter.clone());
    (dispatcher, reporter)
}

async fn open(dispatcher: &Dispatcher) -> Connection {
    let mut connection = connect(dispatcher, Scope::http("GET", "/messages/long_poll"));
    connection.send(body_chunk(b"", false));
    match connection.recv().await {
        Some(Message::HttpResponseStart { status: 200, .. }) => {}
        other => panic!("expected response start, got {other:?}"),
    }
    connection
}

async fn body_text(connection: &mut Connection) -> String {
    let mut text = Vec::new();
    while let Some(Message::HttpResponseBody { body, more_body }) = connection.recv().await {
        text.extend_from_slice(&body);
        if !more_body {
            break;
        }
    }
    String::from_utf8(text).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_wake_all_releases_every_sleeper() {
    let waiting = WaitableRegistry::new();
    let (dispatcher, reporter) = long_poll(waiting.clone());

    let mut first = open(&dispatcher).await;
    let mut second = open(&dispatcher).await;
    assert_eq!(waiting.len(), 2);

    waiting.wake_all();
    assert_eq!(body_text(&mut first).await, "woken");
    assert_eq!(body_text(&mut second).await, "woken");
    first.finish().await;
    second.finish().await;

    assert!(waiting.is_empty());
    assert!(reporter.failures().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_iterating_members_wakes_http_exchanges() {
    let waiting = WaitableRegistry::new();
    let (dispatcher, _) = long_poll(waiting.clone());

    let mut connection = open(&dispatcher).await;
    for member in &waiting {
        if let Request::Http(http) = member {
            http.wake();
        }
    }
    assert_eq!(body_text(&mut connection).await, "woken");
    connection.finish().await;
    assert!(waiting.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sleep_times_out_without_wake() {
    let waiting = WaitableRegistry::new();
    let (dispatcher, _) = long_poll(waiting.clone());

    let mut connection = open(&dispatcher).await;
    assert_eq!(body_text(&mut connection).await, "timed out");
    connection.finish().await;
    assert!(waiting.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_sleeping_leaves_registry() {
    let waiting = WaitableRegistry::new();
    let (dispatcher, reporter) = long_poll(waiting.clone());

    let connection = open(&dispatcher).await;
    assert_eq!(waiting.len(), 1);
    connection.send(Message::HttpDisconnect);
    connection.finish().await;

    assert!(waiting.is_empty());
    assert!(reporter.failures().is_empty());
}

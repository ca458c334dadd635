//! Lifespan handshake and unknown scope handling.

use gateway_adapter::observability::Event;
use gateway_adapter::protocol::{Message, Scope};
use gateway_adapter::{reply, Dispatcher, Request};

mod common;
use common::{connect, CaptureReporter};

fn dispatcher() -> (Dispatcher, CaptureReporter) {
    let reporter = CaptureReporter::default();
    let dispatcher = Dispatcher::new(|_req: Request| async { reply("unused") }).with_reporter(reporter.clone());
    (dispatcher, reporter)
}

#[tokio::test]
async fn test_startup_and_shutdown() {
    let (dispatcher, reporter) = dispatcher();

    let mut connection = connect(&dispatcher, Scope::lifespan());
    connection.send(Message::LifespanStartup);
    assert_eq!(connection.recv().await, Some(Message::LifespanStartupComplete));
    connection.send(Message::LifespanShutdown);
    assert_eq!(connection.recv().await, Some(Message::LifespanShutdownComplete));
    connection.finish().await;

    let events = reporter.events();
    assert!(matches!(
        events.as_slice(),
        [Event::LifespanStartup, Event::LifespanShutdown]
    ));
}

#[tokio::test]
async fn test_unknown_lifespan_message_is_reported() {
    let (dispatcher, reporter) = dispatcher();

    let mut connection = connect(&dispatcher, Scope::lifespan());
    connection.send(Message::HttpDisconnect);
    connection.send(Message::LifespanShutdown);
    assert_eq!(connection.recv().await, Some(Message::LifespanShutdownComplete));
    connection.finish().await;

    let events = reporter.events();
    assert_eq!(events.len(), 2);
    match &events[0] {
        Event::UnknownLifespanMessage(kind) => assert_eq!(kind, "http.disconnect"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_lifespan_ends_when_host_goes_away() {
    let (dispatcher, reporter) = dispatcher();

    let connection = connect(&dispatcher, Scope::lifespan());
    let common::Connection { peer, task } = connection;
    drop(peer);
    task.await.unwrap();
    assert!(reporter.events().is_empty());
}

#[tokio::test]
async fn test_unknown_scope_is_reported() {
    let (dispatcher, reporter) = dispatcher();

    let connection = connect(&dispatcher, Scope::other("foo"));
    connection.finish().await;

    let events = reporter.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::UnknownScope(kind) => assert_eq!(kind, "foo"),
        other => panic!("unexpected {other:?}"),
    }
}

//! Full-stack tests: a real `GatewayServer` on a loopback port.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;

use gateway_adapter::host::HostError;
use gateway_adapter::{reply, Dispatcher, GatewayConfig, GatewayServer, HandlerResult, Request, Shutdown};

async fn app(req: Request) -> HandlerResult {
    match req {
        Request::Http(http) => match http.info().path().as_str() {
            "/echo" => reply(http.body().await?),
            "/query" => reply(format!("{:?}", http.info().querylist())),
            _ => reply("hi!"),
        },
        Request::Websocket(ws) => {
            ws.accept(None).await?;
            let mut incoming = ws.receive_iter();
            while let Some(message) = incoming.next().await {
                ws.send(message?).await?;
            }
            Ok(None)
        }
    }
}

struct TestServer {
    addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), HostError>>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let server = GatewayServer::new(GatewayConfig::default(), Dispatcher::new(app));
        let task = tokio::spawn(server.run(listener, shutdown.clone()));
        Self { addr, shutdown, task }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(self) {
        self.shutdown.trigger();
        self.task.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_plain_get() {
    let server = TestServer::start().await;

    let response = reqwest::get(server.url("/")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "text/plain");
    assert_eq!(response.headers()["content-length"], "3");
    assert_eq!(response.text().await.unwrap(), "hi!");

    server.stop().await;
}

#[tokio::test]
async fn test_post_body_round_trips() {
    let server = TestServer::start().await;

    let client = reqwest::Client::new();
    let response = client
        .post(server.url("/echo"))
        .body("some request body")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "some request body");
    drop(client);

    server.stop().await;
}

#[tokio::test]
async fn test_query_parameters_reach_handler() {
    let server = TestServer::start().await;

    let text = reqwest::get(server.url("/query?a=1&b=two%20words&empty="))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, r#"[("a", "1"), ("b", "two words")]"#);

    server.stop().await;
}

#[tokio::test]
async fn test_websocket_echo() {
    let server = TestServer::start().await;

    let url = format!("ws://{}/ws", server.addr);
    let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    socket.send(tungstenite::Message::text("hello")).await.unwrap();
    let reply = socket.next().await.unwrap().unwrap();
    assert_eq!(reply.to_text().unwrap(), "hello");

    socket.send(tungstenite::Message::binary(vec![1u8, 2, 3])).await.unwrap();
    let reply = socket.next().await.unwrap().unwrap();
    assert_eq!(reply.into_data().as_ref(), &[1, 2, 3]);

    socket.close(None).await.unwrap();
    drop(socket);

    server.stop().await;
}

//! End-to-end tests: a real server on a loopback port, driven by raw TCP
//! clients speaking newline-delimited JSON.

use std::net::SocketAddr;
use std::time::Duration;

use arcane::prelude::*;
use arcane::TcpTransport;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

// =========================================================================
// Helpers
// =========================================================================

const IO_TIMEOUT: Duration = Duration::from_secs(5);

async fn start(builder: ServerBuilder<arcane::TcpConnection>) -> Server<TcpTransport> {
    let mut server = builder.bind("127.0.0.1:0").build();
    server.start().await.expect("server should start");
    server
}

async fn start_default() -> Server<TcpTransport> {
    start(Server::builder()).await
}

fn addr_of(server: &Server<TcpTransport>) -> SocketAddr {
    server.local_addr().expect("running server has an address")
}

/// Polls until the server has registered `n` sessions.
async fn wait_for_sessions(server: &Server<TcpTransport>, n: usize) {
    tokio::time::timeout(IO_TIMEOUT, async {
        while server.supervisor().session_count() != n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "expected {n} sessions, have {}",
            server.supervisor().session_count()
        )
    });
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("should connect");
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn send(&mut self, message: Value) {
        self.send_raw(&message.to_string()).await;
    }

    /// Next line from the server, or `None` on EOF.
    async fn recv_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = tokio::time::timeout(IO_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for the server")
            .expect("read failed");
        (n > 0).then_some(line)
    }

    async fn recv(&mut self) -> Value {
        let line = self.recv_line().await.expect("server closed the connection");
        assert!(line.ends_with('\n'), "frame without delimiter: {line:?}");
        serde_json::from_str(&line).expect("server sent invalid JSON")
    }

    async fn expect_eof(&mut self) {
        assert_eq!(self.recv_line().await, None);
    }
}

fn ping(sent_time: i64) -> Value {
    json!({"tag": "Ping", "payload": {"SentTime": sent_time}})
}

fn auth(token: &str) -> Value {
    json!({"tag": "Auth", "payload": {"Token": token}})
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_start_binds_and_stop_closes_everything() {
    let mut server = start_default().await;
    assert_eq!(server.state(), LifecycleState::Running);
    assert_ne!(addr_of(&server).port(), 0);

    let mut a = Client::connect(addr_of(&server)).await;
    let mut b = Client::connect(addr_of(&server)).await;
    wait_for_sessions(&server, 2).await;

    server.stop().await.expect("stop should succeed");

    assert_eq!(server.state(), LifecycleState::Stopped);
    assert_eq!(server.supervisor().session_count(), 0);
    assert!(server.local_addr().is_none());
    a.expect_eof().await;
    b.expect_eof().await;
}

#[tokio::test]
async fn test_start_while_running_is_rejected() {
    let mut server = start_default().await;

    let err = server.start().await.unwrap_err();

    assert!(matches!(
        err,
        ArcaneError::InvalidState {
            expected: LifecycleState::Stopped,
            actual: LifecycleState::Running,
        }
    ));
    assert_eq!(server.state(), LifecycleState::Running);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_while_stopped_is_rejected() {
    let mut server = Server::builder().bind("127.0.0.1:0").build();

    let err = server.stop().await.unwrap_err();

    assert!(matches!(err, ArcaneError::InvalidState { .. }));
    assert_eq!(server.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_start_on_taken_port_fails_and_stays_stopped() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();
    let mut server = Server::builder().bind(addr.to_string()).build();

    let err = server.start().await.unwrap_err();

    assert!(matches!(err, ArcaneError::Transport(_)));
    assert_eq!(server.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_server_can_restart_after_stop() {
    let mut server = start_default().await;
    server.stop().await.unwrap();

    server.start().await.expect("restart should succeed");
    let mut client = Client::connect(addr_of(&server)).await;
    client.send(ping(1)).await;
    assert_eq!(client.recv().await["tag"], "Ping");

    server.stop().await.unwrap();
}

// =========================================================================
// Message flow
// =========================================================================

#[tokio::test]
async fn test_ping_gets_exactly_one_reply() {
    let mut server = start_default().await;
    let mut client = Client::connect(addr_of(&server)).await;

    client
        .send_raw(r#"{"tag":"Ping","payload":{"SentTime":1000}}"#)
        .await;

    let reply = client.recv().await;
    assert_eq!(reply["tag"], "Ping");
    assert!(reply["payload"]["SentTime"].as_i64().unwrap() >= 1000);

    // Nothing else follows.
    let extra = tokio::time::timeout(Duration::from_millis(100), client.recv_line()).await;
    assert!(extra.is_err());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_auth_then_chat_reaches_everyone() {
    let mut server = start_default().await;
    let mut alice = Client::connect(addr_of(&server)).await;
    let mut bob = Client::connect(addr_of(&server)).await;
    wait_for_sessions(&server, 2).await;

    alice.send(auth("alice")).await;

    let echo = alice.recv().await;
    assert_eq!(echo, auth("alice"));
    let welcome = json!({
        "tag": "Chat",
        "payload": {"Author": "Server", "Content": "Welcome, alice!", "Color": "Server"}
    });
    assert_eq!(alice.recv().await, welcome);
    assert_eq!(bob.recv().await, welcome);

    alice
        .send(json!({"tag": "Chat", "payload": {"Author": "root", "Content": "gg", "Color": ""}}))
        .await;

    let relayed = json!({
        "tag": "Chat",
        "payload": {"Author": "alice", "Content": "gg", "Color": "default"}
    });
    assert_eq!(alice.recv().await, relayed);
    assert_eq!(bob.recv().await, relayed);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unauthenticated_chat_is_dropped_without_disconnect() {
    let mut server = start_default().await;
    let mut client = Client::connect(addr_of(&server)).await;

    client
        .send(json!({"tag": "Chat", "payload": {"Content": "hi"}}))
        .await;
    client.send(ping(5)).await;

    // The chat produced nothing; the first reply is the pong.
    assert_eq!(client.recv().await["tag"], "Ping");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let mut server = start_default().await;
    let mut client = Client::connect(addr_of(&server)).await;

    client.send_raw("this is not json").await;
    client.send_raw(r#"{"tag":"Warp","payload":{}}"#).await;
    client.send_raw(r#"{"tag":"Ping","payload":{"SentTime":"soon"}}"#).await;
    client.send_raw("").await;
    client.send(ping(7)).await;

    assert_eq!(client.recv().await["tag"], "Ping");
    assert_eq!(server.supervisor().session_count(), 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_obj_sync_skips_sender() {
    let mut server = start_default().await;
    let mut alice = Client::connect(addr_of(&server)).await;
    let mut bob = Client::connect(addr_of(&server)).await;
    wait_for_sessions(&server, 2).await;

    alice.send(auth("alice")).await;
    alice.recv().await;
    alice.recv().await;
    bob.recv().await;
    bob.send(auth("bob")).await;
    bob.recv().await;
    bob.recv().await;
    alice.recv().await;

    let sync = json!({
        "tag": "ObjSync",
        "payload": {"ObjectID": "crate-3", "AreaID": "dock", "Variables": {"hp": 40}}
    });
    alice.send(sync.clone()).await;

    assert_eq!(bob.recv().await, sync);
    // Alice's next message is her own pong, not the sync.
    alice.send(ping(1)).await;
    assert_eq!(alice.recv().await["tag"], "Ping");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_client_disconnect_removes_session() {
    let mut server = start_default().await;
    let client = Client::connect(addr_of(&server)).await;
    wait_for_sessions(&server, 1).await;

    drop(client);

    wait_for_sessions(&server, 0).await;
    server.stop().await.unwrap();
}

// =========================================================================
// Bootstrap and heartbeat
// =========================================================================

#[tokio::test]
async fn test_bootstrap_hook_runs_before_first_frame() {
    let builder = Server::builder().bootstrap(|ctx: HandlerContext<arcane::TcpConnection>| async move {
        let greeting = Envelope::new(Chat::server(format!("you are {}", ctx.session().id())));
        let _ = ctx.reply(&greeting).await;
    });
    let mut server = start(builder).await;
    let mut client = Client::connect(addr_of(&server)).await;

    client.send(ping(1)).await;

    let first = client.recv().await;
    assert_eq!(first["tag"], "Chat");
    assert!(
        first["payload"]["Content"]
            .as_str()
            .unwrap()
            .starts_with("you are conn-")
    );
    assert_eq!(client.recv().await["tag"], "Ping");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_silent_client_is_kicked_by_heartbeat() {
    let heartbeat = HeartbeatConfig::default()
        .with_period(Duration::from_secs(1))
        .with_timeout(Duration::from_secs(1));
    let mut server = start(Server::builder().heartbeat(heartbeat)).await;
    let mut silent = Client::connect(addr_of(&server)).await;
    let mut chatty = Client::connect(addr_of(&server)).await;
    wait_for_sessions(&server, 2).await;

    // Keep one client talking while the other says nothing.
    let keepalive = tokio::spawn(async move {
        for _ in 0..12 {
            chatty.send(ping(1)).await;
            chatty.recv().await;
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        chatty
    });

    assert_eq!(
        silent.recv().await,
        json!({"tag": "Disc", "payload": {"Reason": "liveness timeout"}})
    );
    silent.expect_eof().await;

    let _chatty = keepalive.await.unwrap();
    wait_for_sessions(&server, 1).await;
    server.stop().await.unwrap();
}

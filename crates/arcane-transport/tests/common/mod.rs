//! Shared helpers for transport integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arcane_transport::{Connection, ConnectionEvents, ConnectionId};
use tokio::sync::mpsc;

/// What the transport reported, in order.
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    Connected(ConnectionId),
    Frame(ConnectionId, Vec<u8>),
    Closed(ConnectionId),
}

/// An events sink that records every callback and keeps the handles so
/// the test can write to or close them.
pub struct Recorder<C> {
    tx: mpsc::UnboundedSender<Event>,
    conns: Mutex<HashMap<ConnectionId, Arc<C>>>,
}

impl<C: Connection> Recorder<C> {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = Arc::new(Self {
            tx,
            conns: Mutex::new(HashMap::new()),
        });
        (recorder, rx)
    }

    pub fn connection(&self, id: ConnectionId) -> Arc<C> {
        Arc::clone(
            self.conns
                .lock()
                .unwrap()
                .get(&id)
                .expect("connection should be registered"),
        )
    }
}

impl<C: Connection> ConnectionEvents<C> for Recorder<C> {
    async fn on_connect(self: Arc<Self>, conn: C) {
        let id = conn.id();
        self.conns.lock().unwrap().insert(id, Arc::new(conn));
        let _ = self.tx.send(Event::Connected(id));
    }

    async fn on_frame(self: Arc<Self>, id: ConnectionId, frame: Vec<u8>) {
        let _ = self.tx.send(Event::Frame(id, frame));
    }

    async fn on_close(self: Arc<Self>, id: ConnectionId) {
        self.conns.lock().unwrap().remove(&id);
        let _ = self.tx.send(Event::Closed(id));
    }
}

/// Waits (bounded) for the next recorded event.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

/// Waits for a `Connected` event and returns its id.
pub async fn expect_connected(rx: &mut mpsc::UnboundedReceiver<Event>) -> ConnectionId {
    match next_event(rx).await {
        Event::Connected(id) => id,
        other => panic!("expected Connected, got {other:?}"),
    }
}

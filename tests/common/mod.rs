//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use sockjs_xhr::config::AppConfig;
use sockjs_xhr::http::HttpServer;
use sockjs_xhr::lifecycle::Shutdown;
use sockjs_xhr::session::{CloseReason, SessionHandler, SessionId, SessionRegistry, Socket};

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub registry: SessionRegistry,
    pub prefix: String,
}

impl TestServer {
    /// Base URL including the prefix, as `XhrClient` expects it.
    pub fn base(&self) -> String {
        format!("http://{}{}", self.addr, self.prefix)
    }

    pub fn url(&self, server: &str, session: &str, transport: &str) -> String {
        format!("{}/{}/{}/{}", self.base(), server, session, transport)
    }

    /// Wait until `session` has a listener attached.
    pub async fn wait_for_listener(&self, session: &str) {
        let id = SessionId::parse(session).unwrap();
        for _ in 0..200 {
            if self.registry.get(&id).is_some_and(|s| s.has_listener()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no listener attached to {session}");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a server with `config` and `handler` on 127.0.0.1:0.
pub async fn start_server(mut config: AppConfig, handler: Arc<dyn SessionHandler>) -> TestServer {
    config.listener.bind_address = "127.0.0.1:0".into();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let prefix = config.sockjs.prefix.clone();

    let server = HttpServer::new(config, handler);
    let registry = server.registry().clone();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let (_, config_updates) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    TestServer {
        addr,
        shutdown,
        registry,
        prefix,
    }
}

/// Plain HTTP client for requests `XhrClient` does not make.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Handler that echoes, closes on `"bye"`, and records lifecycle events.
#[derive(Default)]
pub struct ScriptedHandler {
    pub events: Mutex<Vec<String>>,
}

impl ScriptedHandler {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl SessionHandler for ScriptedHandler {
    fn on_open(&self, socket: Socket) {
        self.events.lock().unwrap().push(format!("open {}", socket.id()));
    }

    fn on_message(&self, socket: &Socket, payload: String) {
        self.events.lock().unwrap().push(format!("message {payload}"));
        if payload == "bye" {
            socket.close(3000, "Go away!");
        } else {
            let _ = socket.write(payload);
        }
    }

    fn on_close(&self, socket: &Socket, reason: &CloseReason) {
        self.events
            .lock()
            .unwrap()
            .push(format!("close {} {}", socket.id(), reason.code));
    }
}

/// Handler that writes `count` 94-character messages as soon as a session opens,
/// so every message frame is exactly 100 bytes on the wire.
pub struct FloodHandler {
    pub count: usize,
}

impl SessionHandler for FloodHandler {
    fn on_open(&self, socket: Socket) {
        for i in 0..self.count {
            let _ = socket.write(format!("{:0>94}", i));
        }
    }

    fn on_message(&self, _socket: &Socket, _payload: String) {}
}

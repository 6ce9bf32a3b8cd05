//! Live reload over WebSocket.
//!
//! Browsers connect to [`RELOAD_PATH`] through the dev server (the HTTP
//! connection is upgraded in place, no second port). A broadcast writes
//! `{"type":"full-reload"}` to every socket; sockets that fail the write are
//! dropped. Writes happen outside the client lock, so a stalled browser never
//! blocks new connections.
//!
//! ```text
//! watcher ──► plugin.on_change() ──► ReloadHub::full_reload()
//!                                          │
//!                              ┌───────────┼───────────┐
//!                              ▼           ▼           ▼
//!                           browser     browser     browser
//! ```

use crate::log;
use anyhow::{Context, Result, anyhow};
use parking_lot::Mutex;
use std::io::{Read, Write};
use tiny_http::{Header, Request, Response, StatusCode};
use tungstenite::{Message, WebSocket, handshake::derive_accept_key, protocol::Role};

/// WebSocket endpoint the client script connects to.
pub const RELOAD_PATH: &str = "/__tspages/reload";

/// Client script endpoint.
pub const CLIENT_PATH: &str = "/__tspages/client.js";

/// Browser side: reconnecting socket that reloads on `full-reload`.
pub const CLIENT_SCRIPT: &str = include_str!("embed/client.js");

/// Reload message sent to every client.
const FULL_RELOAD: &str = r#"{"type":"full-reload"}"#;

/// Something that can tell connected clients to reload.
pub trait Broadcast: Send + Sync {
    fn full_reload(&self);
}

type Socket = WebSocket<Box<dyn ReadWriteSend>>;

/// `Read + Write + Send`, as handed out by tiny_http's upgrade.
pub trait ReadWriteSend: Read + Write + Send {}
impl<T: Read + Write + Send + ?Sized> ReadWriteSend for T {}

/// Connected reload clients.
#[derive(Default)]
pub struct ReloadHub {
    clients: Mutex<Vec<Socket>>,
}

impl ReloadHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Complete the WebSocket handshake for `request` and keep the socket.
    pub fn accept(&self, request: Request) -> Result<()> {
        let key = request
            .headers()
            .iter()
            .find(|h| h.field.equiv("Sec-WebSocket-Key"))
            .map(|h| h.value.as_str().to_owned());

        let Some(key) = key else {
            let response = Response::from_string("expected a websocket upgrade")
                .with_status_code(StatusCode(400));
            request.respond(response)?;
            return Ok(());
        };

        let response = Response::empty(StatusCode(101))
            .with_header(header("Upgrade", "websocket")?)
            .with_header(header("Connection", "Upgrade")?)
            .with_header(header("Sec-WebSocket-Accept", &derive_accept_key(key.as_bytes()))?);

        let stream = request.upgrade("websocket", response);
        self.add(Box::new(stream));
        log!("reload"; "client connected ({} total)", self.client_count());
        Ok(())
    }

    fn add(&self, stream: Box<dyn ReadWriteSend>) {
        self.clients
            .lock()
            .push(WebSocket::from_raw_socket(stream, Role::Server, None));
    }
}

impl Broadcast for ReloadHub {
    /// Sockets are taken out of the hub for the duration of the send and put
    /// back afterwards, next to any that connected meanwhile.
    fn full_reload(&self) {
        let mut sending = std::mem::take(&mut *self.clients.lock());
        let before = sending.len();
        sending.retain_mut(|socket| socket.send(Message::text(FULL_RELOAD)).is_ok());
        let dropped = before - sending.len();

        let total = {
            let mut clients = self.clients.lock();
            clients.append(&mut sending);
            clients.len()
        };

        if dropped > 0 {
            log!("reload"; "{} client(s) disconnected", dropped);
        }
        log!("reload"; "full reload → {} client(s)", total);
    }
}

pub fn header(field: &str, value: &str) -> Result<Header> {
    Header::from_bytes(field, value).map_err(|()| anyhow!("invalid header `{field}: {value}`"))
}

/// Insert the client script into an HTML page, before `</body>` if present.
pub fn inject_client(html: &str) -> String {
    let tag = format!(r#"<script type="module" src="{CLIENT_PATH}"></script>"#);
    match html.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..pos]);
            out.push_str(&tag);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{tag}"),
    }
}

/// Serve the client script.
pub fn serve_client(request: Request) -> Result<()> {
    let response = Response::from_string(CLIENT_SCRIPT)
        .with_header(header("Content-Type", "application/javascript; charset=utf-8")?);
    request
        .respond(response)
        .context("Failed to send reload client")
}

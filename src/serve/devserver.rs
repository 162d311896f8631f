//! Live-reload transport.
//!
//! WebSocket clients connect on the HTTP port: the upgrade is completed by
//! `tiny_http` and the raw stream handed to `tungstenite`. The server only
//! ever writes to clients, so a client that went away is noticed (and
//! dropped) the next time a send to it fails.
//!
//! Wire messages (text frames):
//!
//! | message            | meaning                                  |
//! |--------------------|------------------------------------------|
//! | `reload<target>`   | reload, navigating to `target` if given  |
//! | `render:start`     | a render started                         |
//! | `render:stop`      | the render finished                      |
//! | `{"type":"log"..}` | a terminal log line                      |

use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tiny_http::{Header, ReadWrite, Request, Response, StatusCode};
use tungstenite::protocol::{Message, Role};
use tungstenite::{WebSocket, handshake::derive_accept_key};

use super::watch::Reloader;
use crate::embed::serve::{CLIENT_HTML, ClientVars};
use crate::render::RenderObserver;
use crate::{debug, logger};

type Client = WebSocket<Box<dyn ReadWrite + Send>>;

#[derive(Serialize)]
struct LogMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    level: &'a str,
    module: &'a str,
    message: &'a str,
}

pub struct DevServer {
    clients: Mutex<Vec<Client>>,
    /// Error of the last failed watcher render, shown instead of pages
    /// until a render succeeds.
    render_error: Mutex<Option<String>>,
    /// When the last client disconnected (or the server started).
    idle_since: Mutex<Option<Instant>>,
}

impl DevServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clients: Mutex::new(Vec::new()),
            render_error: Mutex::new(None),
            idle_since: Mutex::new(Some(Instant::now())),
        })
    }

    /// Whether `request` asks for a WebSocket upgrade.
    pub fn handles(request: &Request) -> bool {
        header_value(request, "Upgrade").is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
    }

    /// Complete the upgrade and register the client.
    pub fn connect(&self, request: Request) -> anyhow::Result<()> {
        let Some(key) = header_value(&request, "Sec-WebSocket-Key") else {
            request.respond(Response::empty(StatusCode(400)))?;
            return Ok(());
        };
        let accept = derive_accept_key(key.as_bytes());
        let response = Response::empty(StatusCode(101)).with_header(
            Header::from_bytes("Sec-WebSocket-Accept", accept.as_bytes())
                .map_err(|()| anyhow::anyhow!("invalid accept header"))?,
        );
        let stream = request.upgrade("websocket", response);
        self.register(WebSocket::from_raw_socket(stream, Role::Server, None));
        Ok(())
    }

    pub(super) fn register(&self, client: Client) {
        let count = {
            let mut clients = self.clients.lock();
            clients.push(client);
            clients.len()
        };
        *self.idle_since.lock() = None;
        debug!("preview"; "client connected ({} total)", count);
    }

    pub fn has_clients(&self) -> bool {
        !self.clients.lock().is_empty()
    }

    /// How long the server has been without clients, if it is.
    pub fn idle_for(&self) -> Option<std::time::Duration> {
        self.idle_since.lock().map(|t| t.elapsed())
    }

    /// Drop clients whose connection is gone.
    pub fn prune(&self) {
        self.retain_sending(|| Message::Ping(Vec::new().into()));
    }

    fn broadcast(&self, text: &str) {
        self.retain_sending(|| Message::Text(text.to_owned().into()));
    }

    fn retain_sending(&self, message: impl Fn() -> Message) {
        let now_empty = {
            let mut clients = self.clients.lock();
            let before = clients.len();
            clients.retain_mut(|ws| ws.send(message()).is_ok());
            before > 0 && clients.is_empty()
        };
        if now_empty {
            self.mark_idle();
        }
    }

    fn mark_idle(&self) {
        let mut idle = self.idle_since.lock();
        if idle.is_none() {
            *idle = Some(Instant::now());
        }
    }

    /// Append the client bootstrap to an HTML body, before `</body>`.
    pub fn inject_client(body: Vec<u8>, input_file: Option<&str>, is_presentation: bool) -> Vec<u8> {
        let script = CLIENT_HTML.render(&ClientVars {
            input_file,
            is_presentation,
        });
        let script = script.as_bytes();

        const PATTERN: &[u8] = b"</body>";
        let pos = body
            .windows(PATTERN.len())
            .rposition(|w| w.eq_ignore_ascii_case(PATTERN))
            .unwrap_or(body.len());

        let mut result = Vec::with_capacity(body.len() + script.len());
        result.extend_from_slice(&body[..pos]);
        result.extend_from_slice(script);
        result.extend_from_slice(&body[pos..]);
        result
    }

    /// Error of the last failed watcher render, if none succeeded since.
    pub fn render_error(&self) -> Option<String> {
        self.render_error.lock().clone()
    }

    /// Mirror terminal log output to connected clients.
    ///
    /// Best effort: a client that is mid-broadcast simply misses the line.
    pub fn install_log_sink(self: &Arc<Self>) {
        let server: Weak<Self> = Arc::downgrade(self);
        logger::set_sink(Box::new(move |module, message| {
            let Some(server) = server.upgrade() else {
                return;
            };
            let level = match module {
                "error" | "warning" => module,
                _ => "info",
            };
            let Ok(json) = serde_json::to_string(&LogMessage {
                kind: "log",
                level,
                module,
                message,
            }) else {
                return;
            };
            if let Some(mut clients) = server.clients.try_lock() {
                clients.retain_mut(|ws| ws.send(Message::Text(json.clone().into())).is_ok());
            }
        }));
    }
}

impl DevServer {
    /// Send the reload instruction, then close and forget every socket;
    /// reloaded pages open fresh connections.
    fn send_reload(&self, target: Option<&str>) {
        let message = format!("reload{}", target.unwrap_or(""));
        let closed = {
            let mut clients = self.clients.lock();
            for ws in clients.iter_mut() {
                let _ = ws.send(Message::Text(message.clone().into()));
                let _ = ws.close(None);
                let _ = ws.flush();
            }
            let closed = clients.len();
            clients.clear();
            closed
        };
        if closed > 0 {
            self.mark_idle();
        }
    }
}

impl Reloader for DevServer {
    fn reload_clients(&self, target: Option<&str>) {
        *self.render_error.lock() = None;
        self.send_reload(target);
    }

    fn render_failed(&self, message: &str) {
        *self.render_error.lock() = Some(message.to_owned());
        self.send_reload(None);
    }
}

impl RenderObserver for DevServer {
    fn render_started(&self) {
        self.broadcast("render:start");
    }

    fn render_stopped(&self) {
        self.broadcast("render:stop");
    }
}

fn header_value(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str().trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    /// A registered server-side socket and its client end.
    fn client_pair(server: &DevServer) -> WebSocket<TcpStream> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        let stream: Box<dyn ReadWrite + Send> = Box::new(accepted);
        server.register(WebSocket::from_raw_socket(stream, Role::Server, None));
        WebSocket::from_raw_socket(client, Role::Client, None)
    }

    fn read_text(ws: &mut WebSocket<TcpStream>) -> String {
        loop {
            match ws.read().unwrap() {
                Message::Text(text) => return text.as_str().to_owned(),
                _ => continue,
            }
        }
    }

    #[test]
    fn test_inject_client_before_body_end() {
        let body = b"<html><body><p>x</p></BODY></html>".to_vec();
        let injected = String::from_utf8(DevServer::inject_client(body, Some("a.qmd"), false)).unwrap();
        let script = injected.find("/quire-preview.js").unwrap();
        assert!(script < injected.find("</BODY>").unwrap());
        assert!(injected.contains(r#"inputFile: "a.qmd""#));

        let injected = DevServer::inject_client(b"<p>fragment</p>".to_vec(), None, false);
        assert!(String::from_utf8(injected).unwrap().starts_with("<p>fragment</p><script>"));
    }

    #[test]
    fn test_render_status_and_reload() {
        let server = DevServer::new();
        assert!(server.idle_for().is_some());
        let mut a = client_pair(&server);
        let mut b = client_pair(&server);
        assert!(server.has_clients());
        assert!(server.idle_for().is_none());

        server.render_started();
        assert_eq!(read_text(&mut a), "render:start");
        assert_eq!(read_text(&mut b), "render:start");

        server.reload_clients(Some("/posts/a.html"));
        assert_eq!(read_text(&mut a), "reload/posts/a.html");
        assert_eq!(read_text(&mut b), "reload/posts/a.html");
        assert!(!server.has_clients());
        assert!(server.idle_for().is_some());
    }

    #[test]
    fn test_render_failure_is_kept_until_next_reload() {
        let server = DevServer::new();
        let mut client = client_pair(&server);

        server.render_failed("engine exited with status 1");
        assert_eq!(read_text(&mut client), "reload");
        assert_eq!(server.render_error().as_deref(), Some("engine exited with status 1"));

        server.reload_clients(None);
        assert!(server.render_error().is_none());
    }

    #[test]
    fn test_dead_clients_are_dropped() {
        let server = DevServer::new();
        let client = client_pair(&server);
        drop(client);

        // the first writes after a peer closes may still succeed
        for _ in 0..50 {
            server.prune();
            if !server.has_clients() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(!server.has_clients());
    }
}

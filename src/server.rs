//! The TCP front-end (§4.I): an accept loop handing each connection to its
//! own thread, idle-timeout deadlines, a connection-tracking table so
//! `close` tears down every live connection exactly once, and dispatch of
//! the line protocol onto the engine.

use crate::engine::Engine;
use crate::protocol::{self, Command, ProtocolError};

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

/// Poll interval for the non-blocking accept loop, used so `close()` can
/// interrupt it without platform-specific socket wakeup tricks.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct Server {
    listener: TcpListener,
    engine: Arc<Engine>,
    idle_timeout: Duration,
    conns: Mutex<std::collections::HashMap<SocketAddr, Arc<Conn>>>,
    closed: AtomicBool,
}

impl Server {
    pub fn bind(addr: &str, engine: Arc<Engine>, idle_timeout: Duration) -> std::io::Result<Arc<Self>> {
        let listener = TcpListener::bind(addr)?;
        Ok(Arc::new(Self {
            listener,
            engine,
            idle_timeout,
            conns: Mutex::new(std::collections::HashMap::new()),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop on the calling thread until `close()` is
    /// called (from any thread). Each accepted connection is handled on
    /// its own spawned thread.
    pub fn serve(self: &Arc<Self>) -> std::io::Result<()> {
        self.listener.set_nonblocking(true)?;

        while !self.closed.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(err) = stream.set_nonblocking(false) {
                        log::warn!("failed to configure connection from {addr}: {err}");
                        continue;
                    }

                    let conn = Arc::new(Conn::new(stream, self.idle_timeout));
                    log::debug!("accepted connection {} from {addr}", conn.id);
                    self.track(addr, conn.clone());

                    let server = self.clone();
                    std::thread::spawn(move || {
                        server.handle_conn(addr, &conn);
                        server.untrack(addr);
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) => {
                    log::warn!("failed to accept connection: {err}");
                }
            }
        }

        Ok(())
    }

    /// Closes the listener (structurally, by flipping the flag the accept
    /// loop polls) and every tracked connection. Idempotent.
    pub fn close(&self) -> std::io::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let conns: Vec<Arc<Conn>> = self.conns.lock().unwrap().drain().map(|(_, conn)| conn).collect();

        let mut first_err = None;
        for conn in conns {
            if let Err(err) = conn.close() {
                log::error!("failed to close connection {}: {err}", conn.peer_addr_display());
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn track(&self, addr: SocketAddr, conn: Arc<Conn>) {
        self.conns.lock().unwrap().insert(addr, conn);
    }

    fn untrack(&self, addr: SocketAddr) {
        self.conns.lock().unwrap().remove(&addr);
    }

    fn handle_conn(&self, addr: SocketAddr, conn: &Arc<Conn>) {
        let reader = BufReader::new(conn.as_ref());
        let mut writer = conn.as_ref();

        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    if err.kind() != std::io::ErrorKind::WouldBlock
                        && err.kind() != std::io::ErrorKind::TimedOut
                    {
                        log::debug!("read error from {addr}: {err}");
                    }
                    break;
                }
            };

            log::debug!("request {} from {addr}: {line}", conn.id);
            if let Err(err) = self.dispatch(&line, &mut writer) {
                log::debug!("write error to {} ({addr}): {err}", conn.id);
                break;
            }
        }

        let _ = conn.close();
        log::debug!("closed connection {} ({addr})", conn.id);
    }

    fn dispatch(&self, line: &str, w: &mut impl Write) -> std::io::Result<()> {
        let command = match protocol::parse(line) {
            Ok(command) => command,
            Err(err) => return protocol::write_error(w, &protocol_error_message(&err)),
        };

        match command {
            Command::Ping => protocol::write_pong(w),
            Command::Keys(pattern) => {
                if pattern != "*" {
                    return protocol::write_error(w, "unsupported KEYS pattern, only '*' is allowed");
                }
                match self.engine.keys() {
                    Ok(keys) => protocol::write_array(w, &keys),
                    Err(err) => {
                        log::error!("keys failed: {err}");
                        protocol::write_error(w, "internal error")
                    }
                }
            }
            Command::Get(key) => match self.engine.get(&key) {
                Ok(value) => protocol::write_bulk_string(w, &value),
                Err(crate::error::Error::KeyNotFound) => protocol::write_null(w),
                Err(err) => {
                    log::error!("get failed: {err}");
                    protocol::write_error(w, "internal error")
                }
            },
            Command::Set { key, value, ttl } => match self.engine.set(&key, &value, ttl) {
                Ok(()) => protocol::write_ok(w),
                Err(crate::error::Error::InvalidSize(msg)) => protocol::write_error(w, &msg),
                Err(err) => {
                    log::error!("set failed: {err}");
                    protocol::write_error(w, "internal error")
                }
            },
            Command::Del(key) => match self.engine.delete(&key) {
                Ok(()) => protocol::write_int(w, 1),
                Err(err) => {
                    log::error!("delete failed: {err}");
                    protocol::write_error(w, "internal error")
                }
            },
        }
    }
}

fn protocol_error_message(err: &ProtocolError) -> String {
    match err {
        ProtocolError::UnknownCommand(verb) => format!("unknown command '{verb}'"),
        ProtocolError::WrongArgs(verb) => format!("wrong number of arguments for '{verb}' command"),
        ProtocolError::InvalidDuration(arg) => format!("invalid duration '{arg}'"),
    }
}

/// A tracked TCP connection that refreshes its idle-timeout deadline on
/// every read and write, and is closed exactly once no matter how many
/// callers ask.
struct Conn {
    id: Uuid,
    stream: TcpStream,
    idle_timeout: Duration,
    closed: AtomicBool,
}

impl Conn {
    fn new(stream: TcpStream, idle_timeout: Duration) -> Self {
        let conn = Self { id: Uuid::new_v4(), stream, idle_timeout, closed: AtomicBool::new(false) };
        conn.refresh_deadline();
        conn
    }

    fn refresh_deadline(&self) {
        let _ = self.stream.set_read_timeout(Some(self.idle_timeout));
        let _ = self.stream.set_write_timeout(Some(self.idle_timeout));
    }

    fn peer_addr_display(&self) -> String {
        self.stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "?".to_string())
    }

    fn close(&self) -> std::io::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.stream.shutdown(std::net::Shutdown::Both)
    }
}

impl std::io::Read for &Conn {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.refresh_deadline();
        (&self.stream).read(buf)
    }
}

impl std::io::Write for &Conn {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.refresh_deadline();
        (&self.stream).write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        (&self.stream).flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn open_engine() -> (tempfile::TempDir, Arc<Engine>) {
        let dir = tempfile::TempDir::with_prefix("bitlogd").unwrap();
        let engine = Arc::new(Engine::open(dir.path()).unwrap());
        (dir, engine)
    }

    fn start_server() -> (tempfile::TempDir, Arc<Server>, std::thread::JoinHandle<()>) {
        let (dir, engine) = open_engine();
        let server = Server::bind("127.0.0.1:0", engine, Duration::from_secs(5)).unwrap();
        let serve_handle = {
            let server = server.clone();
            std::thread::spawn(move || {
                let _ = server.serve();
            })
        };
        // Give the accept loop a moment to flip into non-blocking mode.
        std::thread::sleep(Duration::from_millis(20));
        (dir, server, serve_handle)
    }

    fn roundtrip(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        write!(stream, "{request}\r\n").unwrap();

        let mut reader = BufReader::new(stream);
        let mut response = String::new();

        // Bulk strings and arrays span multiple lines; read enough lines to
        // cover every response shape used in tests.
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        response.push_str(&line);

        if line.starts_with('$') && !line.starts_with("$-1") {
            let mut body = String::new();
            reader.read_line(&mut body).unwrap();
            response.push_str(&body);
        }

        response
    }

    #[test]
    fn ping_returns_pong() {
        let (_dir, server, _handle) = start_server();
        let addr = server.local_addr().unwrap();
        assert_eq!(roundtrip(addr, "PING"), "+PONG\r\n");
        server.close().unwrap();
    }

    #[test]
    fn set_then_get_round_trips() {
        let (_dir, server, _handle) = start_server();
        let addr = server.local_addr().unwrap();
        assert_eq!(roundtrip(addr, "SET k v"), "+OK\r\n");
        assert_eq!(roundtrip(addr, "GET k"), "$1\r\nv\r\n");
        server.close().unwrap();
    }

    #[test]
    fn get_missing_returns_null() {
        let (_dir, server, _handle) = start_server();
        let addr = server.local_addr().unwrap();
        assert_eq!(roundtrip(addr, "GET missing"), "$-1\r\n");
        server.close().unwrap();
    }

    #[test]
    fn del_always_returns_one() {
        let (_dir, server, _handle) = start_server();
        let addr = server.local_addr().unwrap();
        assert_eq!(roundtrip(addr, "DEL missing"), ":1\r\n");
        assert_eq!(roundtrip(addr, "SET k v"), "+OK\r\n");
        assert_eq!(roundtrip(addr, "DEL k"), ":1\r\n");
        server.close().unwrap();
    }

    #[test]
    fn unknown_verb_returns_error_without_breaking_connection() {
        let (_dir, server, _handle) = start_server();
        let addr = server.local_addr().unwrap();
        let response = roundtrip(addr, "NOPE a b");
        assert!(response.starts_with("-ERR"));
        // The connection (and server) must still work afterwards.
        assert_eq!(roundtrip(addr, "PING"), "+PONG\r\n");
        server.close().unwrap();
    }

    #[test]
    fn close_is_idempotent() {
        let (_dir, server, _handle) = start_server();
        server.close().unwrap();
        server.close().unwrap();
    }
}

//! Minimal HTTP/1.1 server for integration tests.
//!
//! Each path carries a scripted sequence of responses, served in order; the
//! last response repeats once the script is exhausted. Lets a test express
//! "two 500s, then a good body" without a real flaky upstream.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: &'static str,
}

pub fn response(status: u16, body: &'static str) -> ScriptedResponse {
    ScriptedResponse { status, body }
}

type Routes = HashMap<&'static str, Vec<ScriptedResponse>>;

/// Starts a server in a background thread on an ephemeral port. Returns the
/// base URL, e.g. "http://127.0.0.1:12345". The server runs until the
/// process exits.
pub fn start(routes: Routes) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let state: Arc<Mutex<HashMap<&'static str, (usize, Vec<ScriptedResponse>)>>> = Arc::new(
        Mutex::new(routes.into_iter().map(|(k, v)| (k, (0usize, v))).collect()),
    );
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&state);
            thread::spawn(move || handle(stream, &state));
        }
    });
    format!("http://127.0.0.1:{}", port)
}

fn handle(
    mut stream: std::net::TcpStream,
    state: &Mutex<HashMap<&'static str, (usize, Vec<ScriptedResponse>)>>,
) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let path = match request_path(request) {
        Some(p) => p,
        None => return,
    };

    let scripted = {
        let mut state = state.lock().unwrap();
        state.get_mut(path).and_then(|(next, responses)| {
            let last = responses.len().checked_sub(1)?;
            let idx = (*next).min(last);
            *next += 1;
            Some(responses[idx].clone())
        })
    };
    let scripted = scripted.unwrap_or(ScriptedResponse {
        status: 404,
        body: "no such route",
    });

    let reason = match scripted.status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        scripted.status,
        reason,
        scripted.body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(scripted.body.as_bytes());
}

/// Extracts the request path from "GET /path HTTP/1.1".
fn request_path(request: &str) -> Option<&str> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    let _method = parts.next()?;
    let target = parts.next()?;
    Some(target.split('?').next().unwrap_or(target))
}

// src/ai/canned_http.rs
//! One-shot local HTTP server for exercising the real clients in tests.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

pub(crate) struct CannedServer {
    pub url: String,
    handle: JoinHandle<String>,
}

impl CannedServer {
    /// Wait for the single request and return its head and body as text.
    pub fn request(self) -> String {
        self.handle.join().unwrap()
    }
}

/// Answer exactly one request with `status`, a `Content-Type` and `body`.
pub(crate) fn serve_once(status: &str, content_type: &str, body: &[u8]) -> CannedServer {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let mut response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request = String::new();
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap();
                }
            }
            request.push_str(&line);
            if line == "\r\n" || line.is_empty() {
                break;
            }
        }
        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).unwrap();
        request.push_str(&String::from_utf8_lossy(&body));

        stream.write_all(&response).unwrap();
        stream.flush().unwrap();
        request
    });

    CannedServer { url, handle }
}

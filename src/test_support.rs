//! A loopback HTTP stub for the provider clients: one canned reply per
//! connection, every request recorded.

use serde_json::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

pub struct CannedReply {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl CannedReply {
    pub fn json(status: u16, body: Value) -> Self {
        Self { status, content_type: "application/json", body: body.to_string().into_bytes() }
    }

    pub fn bytes(status: u16, content_type: &'static str, body: &[u8]) -> Self {
        Self { status, content_type, body: body.to_vec() }
    }
}

#[derive(Debug)]
pub struct RecordedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub struct StubServer {
    listener: TcpListener,
    pub base: String,
}

impl StubServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        Self { listener, base }
    }

    /// Answers one connection per reply, in order, then yields what it read.
    pub fn serve(self, replies: Vec<CannedReply>) -> JoinHandle<Vec<RecordedRequest>> {
        tokio::spawn(async move {
            let mut seen = Vec::with_capacity(replies.len());
            for reply in replies {
                let (mut stream, _) = self.listener.accept().await.unwrap();
                seen.push(read_request(&mut stream).await);
                let head = format!(
                    "HTTP/1.1 {} STUB\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    reply.status,
                    reply.content_type,
                    reply.body.len()
                );
                stream.write_all(head.as_bytes()).await.unwrap();
                stream.write_all(&reply.body).await.unwrap();
                let _ = stream.shutdown().await;
            }
            seen
        })
    }
}

async fn read_request(stream: &mut TcpStream) -> RecordedRequest {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).into_owned();
            let body_start = end + 4;
            let request = RecordedRequest { head, body: Vec::new() };
            let complete = match request.header("content-length").and_then(|v| v.parse::<usize>().ok()) {
                Some(len) => buf.len() >= body_start + len,
                None if request.header("transfer-encoding").is_some() => buf.ends_with(b"0\r\n\r\n"),
                None => true,
            };
            if complete {
                return RecordedRequest { body: buf[body_start..].to_vec(), ..request };
            }
        }
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            let head = String::from_utf8_lossy(&buf).into_owned();
            return RecordedRequest { head, body: Vec::new() };
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

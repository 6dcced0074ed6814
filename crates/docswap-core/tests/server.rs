//! End-to-end tests against a real listener

use docswap_core::{FileServer, Monitor, MonitorConfig, ServerConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

static COUNTER: AtomicU64 = AtomicU64::new(0);

struct Site {
    root: PathBuf,
}

impl Site {
    fn new(name: &str) -> Self {
        let root = std::env::temp_dir().join(format!(
            "docswap-it-{}-{}-{}",
            name,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    fn path(&self) -> &Path {
        &self.root
    }

    fn write(&self, rel: &str, contents: &[u8]) {
        std::fs::write(self.root.join(rel), contents).unwrap();
    }

    fn read(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.root.join(rel)).unwrap()
    }
}

impl Drop for Site {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

struct Reply {
    status: u16,
    head: String,
    body: Vec<u8>,
}

async fn send(addr: SocketAddr, request: &[u8]) -> std::io::Result<Reply> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(request).await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;

    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response head");
    let head = String::from_utf8_lossy(&raw[..split]).to_ascii_lowercase();
    let status = head[9..12].parse().unwrap();
    Ok(Reply {
        status,
        head,
        body: raw[split + 4..].to_vec(),
    })
}

async fn get(addr: SocketAddr, path: &str) -> Reply {
    let request = format!("GET {path} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n");
    send(addr, request.as_bytes()).await.unwrap()
}

async fn upload(addr: SocketAddr, content_type: &str, payload: &[u8]) -> Reply {
    let mut body = b"--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"index.html\"\r\n\
Content-Type: text/html\r\n\r\n"
        .to_vec();
    body.extend_from_slice(payload);
    body.extend_from_slice(b"\r\n--XYZ--\r\n");

    let mut request = format!(
        "POST /upload HTTP/1.1\r\nHost: test\r\nConnection: close\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(&body);
    send(addr, &request).await.unwrap()
}

fn config(site: &Site) -> ServerConfig {
    ServerConfig::new(site.path())
        .hostname("127.0.0.1")
        .port(0)
        .restart_delay(Duration::from_millis(50))
}

#[tokio::test]
async fn test_serves_document_and_files() {
    let site = Site::new("serve");
    site.write("index.html", b"<p>home</p>");
    site.write("style.css", b"p{}");
    let server = FileServer::new(config(&site));
    let addr = server.start().await.unwrap();

    let home = get(addr, "/").await;
    assert_eq!(home.status, 200);
    assert!(home.head.contains("content-type: text/html"));
    assert_eq!(home.body, b"<p>home</p>");

    let css = get(addr, "/style.css").await;
    assert_eq!(css.status, 200);
    assert!(css.head.contains("content-type: text/css"));

    let missing = get(addr, "/missing.png").await;
    assert_eq!(missing.status, 404);
    assert_eq!(missing.body, b"404 - File Not Found");

    // Every connection above was closed by the client
    for _ in 0..50 {
        if server.active_connections() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.active_connections(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_upload_swaps_document_and_restarts() {
    let site = Site::new("upload");
    site.write("index.html", b"before");
    let server = FileServer::new(config(&site));
    let addr = server.start().await.unwrap();

    let reply = upload(addr, "multipart/form-data; boundary=XYZ", b"hello world!").await;
    assert_eq!(reply.status, 200);
    assert!(reply.head.contains("access-control-allow-origin: *"));
    let json: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(site.read("index.html"), b"hello world!");

    // The restart rebinds the same port
    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut body = None;
    for _ in 0..20 {
        let request = b"GET / HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n";
        if let Ok(reply) = send(addr, request).await {
            body = Some(reply.body);
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(body.as_deref(), Some(&b"hello world!"[..]));
    assert!(server.is_running());
    assert_eq!(server.local_addr(), Some(addr));

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_upload_leaves_document() {
    let site = Site::new("malformed");
    site.write("index.html", b"keep me");
    let server = FileServer::new(config(&site));
    let addr = server.start().await.unwrap();

    let reply = upload(addr, "multipart/form-data", b"evil").await;
    assert_eq!(reply.status, 400);
    assert_eq!(site.read("index.html"), b"keep me");

    let reply = get(addr, "/upload").await;
    assert_eq!(reply.status, 405);
    let json: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(json["success"], false);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_method_on_upload_gets_json_405() {
    let site = Site::new("unknown-method");
    site.write("index.html", b"doc");
    let server = FileServer::new(config(&site));
    let addr = server.start().await.unwrap();

    let request = b"PROPFIND /upload HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n";
    let reply = send(addr, request).await.unwrap();
    assert_eq!(reply.status, 405);
    assert!(reply.head.contains("access-control-allow-origin: *"));
    assert!(reply.head.contains("content-type: application/json"));
    let json: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(json["success"], false);

    // Other paths keep the plain-text reply
    let request = b"PROPFIND /index.html HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n";
    let reply = send(addr, request).await.unwrap();
    assert_eq!(reply.status, 405);
    assert!(reply.head.contains("content-type: text/plain"));
    assert!(!reply.head.contains("access-control-allow-origin"));

    server.stop().await;
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let site = Site::new("oversized");
    site.write("index.html", b"small");
    let server = FileServer::new(config(&site).max_upload_size(64));
    let addr = server.start().await.unwrap();

    let reply = upload(addr, "multipart/form-data; boundary=XYZ", &[b'a'; 512]).await;

    assert_eq!(reply.status, 413);
    assert_eq!(site.read("index.html"), b"small");
    server.stop().await;
}

#[tokio::test]
async fn test_start_fails_without_document() {
    let site = Site::new("no-document");
    let server = FileServer::new(config(&site));

    assert!(server.start().await.is_err());
    assert!(!server.is_running());
    assert_eq!(server.document().path(), site.path().join("index.html"));

    site.write("index.html", b"late");
    let addr = server.start().await.unwrap();
    assert_eq!(get(addr, "/").await.body, b"late");
    server.stop().await;
}

#[tokio::test]
async fn test_monitor_checks_local_server() {
    let site = Site::new("monitor");
    site.write("index.html", b"0123456789");
    let server = FileServer::new(config(&site));
    server.start().await.unwrap();
    let monitor = Monitor::new(MonitorConfig::default()).local_server(server.clone());

    let up = monitor.check_now().await;
    let response = up.outcome.as_ref().unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.content_length, Some(10));
    assert_eq!(response.content_type.as_deref(), Some("text/html"));
    assert!(up.target.unwrap().local);

    server.stop().await;
    let down = monitor.check_now().await;
    assert!(!down.is_success());

    let stats = monitor.statistics();
    assert_eq!(stats.total_checks, 2);
    assert_eq!(stats.consecutive_failures, 1);
    assert_eq!(stats.success_rate(), Some(50.0));
}

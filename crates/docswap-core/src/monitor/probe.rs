//! Outbound HTTP probe
//!
//! A plain HTTP/1.1 GET over a fresh TCP connection. The connect phase and
//! the wait for response headers have separate timeouts; the body is never
//! read.

use bytes::Bytes;
use http::header::{
    HeaderName, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, SERVER, USER_AGENT,
};
use http::Uri;
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

pub const DEFAULT_USER_AGENT: &str = "WebServerMonitor/1.0";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// Why a target was unreachable
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("no probe target")]
    NoTarget,

    #[error("invalid url {0}")]
    InvalidUrl(String),

    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("{phase} timed out after {}ms", .after.as_millis())]
    Timeout { phase: &'static str, after: Duration },

    #[error("request failed: {0}")]
    Request(String),
}

/// What a reachable target answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    /// From request start until the status line was available
    pub latency: Duration,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub server: Option<String>,
}

/// Something that can check a URL
pub trait Probe: Send + Sync + 'static {
    fn check(&self, url: &str) -> impl Future<Output = Result<ProbeResponse, ProbeError>> + Send;
}

/// Probe over hyper's HTTP/1 client connection
#[derive(Debug, Clone)]
pub struct HttpProbe {
    connect_timeout: Duration,
    read_timeout: Duration,
    user_agent: String,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpProbe {
    pub fn new(
        connect_timeout: Duration,
        read_timeout: Duration,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            connect_timeout,
            read_timeout,
            user_agent: user_agent.into(),
        }
    }

    async fn get(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        let uri: Uri = url
            .parse()
            .map_err(|_| ProbeError::InvalidUrl(url.to_string()))?;

        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(ProbeError::UnsupportedScheme(other.to_string())),
            None => return Err(ProbeError::InvalidUrl(url.to_string())),
        }

        let authority = uri
            .authority()
            .ok_or_else(|| ProbeError::InvalidUrl(url.to_string()))?
            .clone();
        // IPv6 literals keep their brackets in the authority
        let host = authority.host().trim_start_matches('[').trim_end_matches(']');
        let port = authority.port_u16().unwrap_or(80);
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

        let started = Instant::now();

        let stream = timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ProbeError::Timeout {
                phase: "connect",
                after: self.connect_timeout,
            })?
            .map_err(|e| ProbeError::Connect(e.to_string()))?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "probe connection closed with error");
            }
        });

        let request = http::Request::get(path)
            .header(HOST, authority.as_str())
            .header(USER_AGENT, self.user_agent.as_str())
            .header(CONNECTION, "close")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let response = timeout(self.read_timeout, sender.send_request(request))
            .await
            .map_err(|_| ProbeError::Timeout {
                phase: "read",
                after: self.read_timeout,
            })?
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let latency = started.elapsed();
        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };

        Ok(ProbeResponse {
            status: response.status().as_u16(),
            latency,
            content_length: header(CONTENT_LENGTH).and_then(|v| v.parse().ok()),
            content_type: header(CONTENT_TYPE),
            server: header(SERVER),
        })
    }
}

impl Probe for HttpProbe {
    fn check(&self, url: &str) -> impl Future<Output = Result<ProbeResponse, ProbeError>> + Send {
        self.get(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one connection, capture the request head and answer with `reply`
    async fn one_shot_server(reply: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut head = Vec::new();
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            stream.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&head).into_owned()
        });
        (format!("http://{addr}/status?x=1"), handle)
    }

    #[tokio::test]
    async fn test_probe_reads_headers() {
        let (url, server) = one_shot_server(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 5\r\nServer: test\r\nConnection: close\r\n\r\nhello",
        )
        .await;

        let response = HttpProbe::default().check(&url).await.unwrap();
        let head = server.await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.content_length, Some(5));
        assert_eq!(response.content_type.as_deref(), Some("text/html"));
        assert_eq!(response.server.as_deref(), Some("test"));
        assert!(head.starts_with("GET /status?x=1 HTTP/1.1\r\n"));
        assert!(head.to_ascii_lowercase().contains("user-agent: webservermonitor/1.0"));
    }

    #[tokio::test]
    async fn test_error_status_still_reachable() {
        let (url, _server) = one_shot_server(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let response = HttpProbe::default().check(&url).await.unwrap();
        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = HttpProbe::default()
            .check(&format!("http://{addr}/"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Connect(_)));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _silent = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let probe = HttpProbe::new(Duration::from_secs(1), Duration::from_millis(100), "t");
        let err = probe.check(&format!("http://{addr}/")).await.unwrap_err();
        assert_eq!(
            err,
            ProbeError::Timeout {
                phase: "read",
                after: Duration::from_millis(100)
            }
        );
    }

    #[tokio::test]
    async fn test_rejects_https_and_garbage() {
        let probe = HttpProbe::default();
        assert_eq!(
            probe.check("https://example.com").await.unwrap_err(),
            ProbeError::UnsupportedScheme("https".to_string())
        );
        assert!(matches!(
            probe.check("not a url").await.unwrap_err(),
            ProbeError::InvalidUrl(_)
        ));
    }
}

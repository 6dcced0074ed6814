//! Native HTTP server implementation
//!
//! One hyper HTTP/1.1 connection task per accepted socket. The server owns
//! the document slot and the two handlers; the upload handler reaches back
//! into the server only through a restart hook built from a weak reference.
//!
//! Lifecycle: `start` is a no-op while running, `stop` is a no-op while
//! stopped, `restart` is `stop` then `start`. Stopping closes the listener
//! and lets admitted requests finish; idle keep-alive connections are closed.

use crate::document::{DocumentSlot, SwapStrategy, DEFAULT_DOCUMENT, DEFAULT_TEMP_DOCUMENT};
use crate::handlers::{RestartHook, StaticFiles, UploadError, UploadHandler, DEFAULT_RESTART_DELAY};
use crate::{Error, Method, Request, Response, Result, StatusCode};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
    /// Directory files are served from
    pub root: PathBuf,
    /// Document slot file name inside `root`
    pub document: String,
    /// Temporary file name used while swapping the document
    pub temp_document: String,
    pub upload_path: String,
    /// Request body limit in bytes
    pub max_upload_size: usize,
    /// Delay between a successful upload and the restart
    pub restart_delay: Duration,
    pub swap_strategy: SwapStrategy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 11000,
            root: PathBuf::from("."),
            document: DEFAULT_DOCUMENT.to_string(),
            temp_document: DEFAULT_TEMP_DOCUMENT.to_string(),
            upload_path: "/upload".to_string(),
            max_upload_size: 16 * 1024 * 1024,
            restart_delay: DEFAULT_RESTART_DELAY,
            swap_strategy: SwapStrategy::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn document(mut self, name: impl Into<String>) -> Self {
        self.document = name.into();
        self
    }

    pub fn upload_path(mut self, path: impl Into<String>) -> Self {
        self.upload_path = path.into();
        self
    }

    pub fn max_upload_size(mut self, bytes: usize) -> Self {
        self.max_upload_size = bytes;
        self
    }

    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn swap_strategy(mut self, strategy: SwapStrategy) -> Self {
        self.swap_strategy = strategy;
        self
    }

    /// Configured listen address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .hostname
            .parse()
            .map_err(|_| Error::InvalidAddress(self.hostname.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn document_slot(&self) -> DocumentSlot {
        DocumentSlot::new(&self.root, &self.document, &self.temp_document)
            .strategy(self.swap_strategy)
    }
}

/// Tracks active connections
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    active: AtomicU64,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn decrement(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

/// A live listener: cancel the token and join the accept loop to stop it
struct Running {
    shutdown: CancellationToken,
    accept_loop: JoinHandle<()>,
}

struct Inner {
    config: ServerConfig,
    document: DocumentSlot,
    static_files: StaticFiles,
    upload: UploadHandler,
    running: tokio::sync::Mutex<Option<Running>>,
    is_running: AtomicBool,
    /// Last bound address, kept across stop so restart reuses the port
    local_addr: RwLock<Option<SocketAddr>>,
    connections: ConnectionTracker,
}

/// Static file server with document upload
///
/// Cheap to clone; all clones control the same listener.
#[derive(Clone)]
pub struct FileServer {
    inner: Arc<Inner>,
}

impl FileServer {
    pub fn new(config: ServerConfig) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let document = config.document_slot();
            let upload = UploadHandler::new(document.clone(), restart_hook(weak.clone()))
                .restart_delay(config.restart_delay);

            Inner {
                static_files: StaticFiles::new(config.root.clone(), document.clone()),
                document,
                upload,
                running: tokio::sync::Mutex::new(None),
                is_running: AtomicBool::new(false),
                local_addr: RwLock::new(None),
                connections: ConnectionTracker::new(),
                config,
            }
        });

        Self { inner }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn document(&self) -> &DocumentSlot {
        &self.inner.document
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running.load(Ordering::SeqCst)
    }

    /// Address of the current (or last) listener
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.read()
    }

    pub fn active_connections(&self) -> u64 {
        self.inner.connections.count()
    }

    /// Bind and start accepting; returns the bound address
    ///
    /// Fails with [`Error::DocumentMissing`] if the document slot is absent.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut running = self.inner.running.lock().await;
        if running.is_some() {
            info!("web server already running");
            return self.local_addr().ok_or_else(|| {
                Error::InvalidAddress("running without a bound address".to_string())
            });
        }

        if !self.inner.document.exists().await {
            let path = self.inner.document.path().to_path_buf();
            error!(path = %path.display(), "document not found, server not started");
            return Err(Error::DocumentMissing(path));
        }

        let addr = self.bind_addr()?;
        let socket = create_listen_socket(&addr).map_err(|source| Error::Bind { addr, source })?;
        let listener = TcpListener::from_std(socket.into())?;
        let local = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let accept_loop = tokio::spawn(accept_loop(self.inner.clone(), listener, shutdown.clone()));

        *running = Some(Running {
            shutdown,
            accept_loop,
        });
        *self.inner.local_addr.write() = Some(local);
        self.inner.is_running.store(true, Ordering::SeqCst);

        info!(address = %local, upload = %self.inner.config.upload_path, "web server started");
        Ok(local)
    }

    /// Close the listener; admitted requests run to completion
    pub async fn stop(&self) {
        let mut running = self.inner.running.lock().await;
        let Some(Running {
            shutdown,
            accept_loop,
        }) = running.take()
        else {
            return;
        };

        shutdown.cancel();
        if let Err(e) = accept_loop.await {
            warn!(error = %e, "accept loop ended abnormally");
        }
        self.inner.is_running.store(false, Ordering::SeqCst);
        info!(
            draining = self.inner.connections.count(),
            "web server stopped"
        );
    }

    pub async fn restart(&self) -> Result<SocketAddr> {
        info!("restarting web server");
        self.stop().await;
        self.start().await
    }

    /// Configured address, reusing the last ephemeral port if the port is 0
    fn bind_addr(&self) -> Result<SocketAddr> {
        let mut addr = self.inner.config.socket_addr()?;
        if addr.port() == 0 {
            if let Some(last) = self.local_addr() {
                addr.set_port(last.port());
            }
        }
        Ok(addr)
    }
}

fn restart_hook(server: Weak<Inner>) -> RestartHook {
    Arc::new(move || {
        let server = server.clone();
        Box::pin(async move {
            let Some(inner) = server.upgrade() else {
                return;
            };
            if let Err(e) = (FileServer { inner }).restart().await {
                error!(error = %e, "restart after upload failed");
            }
        })
    })
}

/// Create a TCP listening socket
pub fn create_listen_socket(addr: &SocketAddr) -> std::io::Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - rebind immediately on restart
    socket.set_reuse_address(true)?;

    // TCP_NODELAY - disable Nagle's algorithm for lower latency
    socket.set_nodelay(true)?;

    socket.set_nonblocking(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(1024)?;

    Ok(socket)
}

async fn accept_loop(inner: Arc<Inner>, listener: TcpListener, shutdown: CancellationToken) {
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            },
            _ = shutdown.cancelled() => break,
        };

        tokio::spawn(serve_connection(inner.clone(), stream, peer, shutdown.clone()));
    }
    debug!("listener closed");
}

async fn serve_connection(
    inner: Arc<Inner>,
    stream: TcpStream,
    peer: SocketAddr,
    shutdown: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
    }
    inner.connections.increment();

    let io = TokioIo::new(stream);
    let state = inner.clone();
    let service = service_fn(move |req| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(dispatch(&state, req, peer).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        debug!(peer = %peer, error = %e, "connection error");
    }

    inner.connections.decrement();
}

async fn dispatch(
    inner: &Inner,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
) -> hyper::Response<Full<Bytes>> {
    let limit = inner.config.max_upload_size;
    let is_upload = req.uri().path() == inner.config.upload_path;

    let request = match from_hyper_request(req, peer, limit).await {
        Ok(request) => request,
        Err(ReadError::TooLarge) if is_upload => {
            return to_hyper_response(UploadError::BodyTooLarge { limit }.into_response())
        }
        Err(ReadError::TooLarge) => {
            return to_hyper_response(Response::text(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Payload Too Large",
            ))
        }
        Err(ReadError::Method(method)) => {
            debug!(method = %method, "unsupported method");
            let response = if is_upload {
                UploadError::MethodNotAllowed.into_response()
            } else {
                Response::method_not_allowed()
            };
            return to_hyper_response(response);
        }
        Err(ReadError::Body(e)) => {
            debug!(peer = %peer, error = %e, "failed to read request body");
            return to_hyper_response(Response::text(StatusCode::BAD_REQUEST, "Bad Request"));
        }
    };

    let response = if is_upload {
        inner.upload.handle(&request).await
    } else {
        inner.static_files.handle(&request).await
    };
    to_hyper_response(response)
}

enum ReadError {
    Method(String),
    TooLarge,
    Body(String),
}

/// Convert hyper request to our Request type, buffering at most `limit` body bytes
async fn from_hyper_request(
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
    limit: usize,
) -> std::result::Result<Request, ReadError> {
    let (parts, body) = req.into_parts();
    let method = Method::from_str(parts.method.as_str())
        .map_err(|_| ReadError::Method(parts.method.to_string()))?;

    let mut request = Request::new(method, parts.uri.path());
    request.remote_addr = Some(peer);

    for (name, value) in &parts.headers {
        if let Ok(v) = value.to_str() {
            request.headers.push((name.to_string(), v.to_string()));
        }
    }

    request.body = Limited::new(body, limit)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                ReadError::TooLarge
            } else {
                ReadError::Body(e.to_string())
            }
        })?
        .to_bytes();

    Ok(request)
}

/// Convert our Response to hyper Response
fn to_hyper_response(res: Response) -> hyper::Response<Full<Bytes>> {
    let mut builder = hyper::Response::builder().status(res.status.as_u16());

    for (name, value) in &res.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder.body(Full::new(res.body)).unwrap_or_else(|e| {
        error!(error = %e, "invalid response");
        let mut fallback = hyper::Response::new(Full::new(Bytes::new()));
        *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

//! Shared server registry
//!
//! One listener and one multiplexer per TCP port, shared by every route that
//! names the port. The first route to activate a port decides whether it is
//! served over TLS; later routes on the same port get the existing listener
//! unchanged.
//!
//! See the crate documentation for how the registry fits into route
//! activation.

use crate::{responses, FailureDelivery, RouteManager, ServerError, TlsFiles};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{Method, Request},
    response::Response,
    Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use std::collections::HashMap;
use std::fmt;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

// ============================================================================
// Multiplexer
// ============================================================================

#[derive(Clone)]
struct MuxEntry {
    method: Option<Method>,
    manager: Arc<dyn RouteManager>,
}

/// Path-to-handler table of one port
///
/// Handlers can be added while the listener is serving but never removed.
pub struct Mux {
    port: u16,
    handlers: RwLock<HashMap<String, MuxEntry>>,
}

impl Mux {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Attach `manager` to `path` unless a handler already exists
    ///
    /// Returns `true` if the handler was attached.
    pub fn register(
        &self,
        path: &str,
        method: Option<Method>,
        manager: Arc<dyn RouteManager>,
    ) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if handlers.contains_key(path) {
            return false;
        }

        handlers.insert(path.to_string(), MuxEntry { method, manager });
        true
    }

    pub fn contains(&self, path: &str) -> bool {
        self.read().contains_key(path)
    }

    /// Number of paths with a handler
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, MuxEntry>> {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn resolve(&self, path: &str) -> Option<MuxEntry> {
        self.read().get(path).cloned()
    }

    /// Build the axum router serving this multiplexer
    pub fn router(self: &Arc<Self>, max_body_size: usize) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(Arc::clone(self))
            .layer(DefaultBodyLimit::max(max_body_size))
            .layer(TraceLayer::new_for_http())
    }
}

impl fmt::Debug for Mux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<String> = self.read().keys().cloned().collect();
        paths.sort();
        f.debug_struct("Mux")
            .field("port", &self.port)
            .field("paths", &paths)
            .finish()
    }
}

/// Route a request to the handler registered for its path
async fn dispatch(State(mux): State<Arc<Mux>>, request: Request<Body>) -> Response {
    let path = request.uri().path().to_string();

    let Some(entry) = mux.resolve(&path) else {
        warn!(port = mux.port(), endpoint = %path, "no route registered for endpoint");
        return responses::not_found(format!("no route is registered for {}", path));
    };

    if let Some(expected) = &entry.method {
        if request.method() != expected {
            warn!(
                port = mux.port(),
                endpoint = %path,
                http_method = %request.method(),
                "request method does not match the route"
            );
            return responses::method_not_allowed(format!(
                "{} only accepts {} requests",
                path, expected
            ));
        }
    }

    entry.manager.handle_route(request).await
}

// ============================================================================
// Active Server
// ============================================================================

/// Transport a shared listener serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Plain,
    Tls,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "http"),
            Self::Tls => write!(f, "https"),
        }
    }
}

/// Listener, multiplexer and failure channel of one port
pub struct ActiveServer {
    port: u16,
    scheme: Scheme,
    mux: Arc<Mux>,
    local_addr: Option<SocketAddr>,
    handle: Handle,
    failure: watch::Sender<Option<ServerError>>,
    observed: Arc<AtomicBool>,
    delivery: FailureDelivery,
}

impl ActiveServer {
    /// Bind the port and start serving on a background task
    ///
    /// Binding happens before returning so the socket accepts connections as
    /// soon as the route is signaled ready. A bind failure is published on
    /// the failure channel rather than returned.
    fn start(
        port: u16,
        tls: Option<TlsFiles>,
        delivery: FailureDelivery,
        max_body_size: usize,
    ) -> Arc<Self> {
        let scheme = if tls.is_some() {
            Scheme::Tls
        } else {
            Scheme::Plain
        };

        let bound = TcpListener::bind(("0.0.0.0", port)).and_then(|listener| {
            listener.set_nonblocking(true)?;
            Ok(listener)
        });
        let local_addr = bound
            .as_ref()
            .ok()
            .and_then(|listener| listener.local_addr().ok());

        let (failure, _) = watch::channel(None);
        let server = Arc::new(Self {
            port,
            scheme,
            mux: Arc::new(Mux::new(port)),
            local_addr,
            handle: Handle::new(),
            failure,
            observed: Arc::new(AtomicBool::new(false)),
            delivery,
        });

        match bound {
            Ok(listener) => {
                info!(port, scheme = %scheme, address = ?local_addr, "starting http server");
                let router = server.mux.router(max_body_size);
                tokio::spawn(serve(Arc::clone(&server), listener, tls, router));
            }
            Err(e) => {
                error!(port, error = %e, "failed to bind http server");
                server.fail(ServerError::BindFailed {
                    port,
                    message: e.to_string(),
                });
            }
        }

        server
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn mux(&self) -> &Arc<Mux> {
        &self.mux
    }

    /// Address the listener is bound to, if binding succeeded
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Subscribe to the failure of this listener
    pub fn failures(&self) -> ServerFailures {
        ServerFailures {
            receiver: self.failure.subscribe(),
            observed: Arc::clone(&self.observed),
            delivery: self.delivery,
        }
    }

    /// Failure published by the listener, if it has stopped
    pub fn failure(&self) -> Option<ServerError> {
        self.failure.borrow().clone()
    }

    /// Close the listener and all of its connections immediately
    pub fn shutdown(&self) {
        self.handle.shutdown();
    }

    /// Stop accepting connections and give in-flight requests `grace` to finish
    pub fn graceful_shutdown(&self, grace: Duration) {
        self.handle.graceful_shutdown(Some(grace));
    }

    fn fail(&self, error: ServerError) {
        self.failure.send_replace(Some(error));
    }
}

impl fmt::Debug for ActiveServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveServer")
            .field("port", &self.port)
            .field("scheme", &self.scheme)
            .field("local_addr", &self.local_addr)
            .field("mux", &self.mux)
            .finish()
    }
}

async fn serve(
    server: Arc<ActiveServer>,
    listener: TcpListener,
    tls: Option<TlsFiles>,
    router: Router,
) {
    let port = server.port;
    let handle = server.handle.clone();

    let result = match tls {
        Some(files) => {
            // Several providers may be compiled in; pick one for the process
            let _ = rustls::crypto::ring::default_provider().install_default();
            serve_tls(listener, files, handle, router, port).await
        }
        None => axum_server::from_tcp(listener)
            .handle(handle)
            .serve(router.into_make_service())
            .await
            .map_err(|e| ServerError::ServeFailed {
                port,
                message: e.to_string(),
            }),
    };

    match result {
        Ok(()) => {
            info!(port, "http server closed");
            server.fail(ServerError::Closed { port });
        }
        Err(e) => {
            error!(port, error = %e, "http server stopped");
            server.fail(e);
        }
    }
}

async fn serve_tls(
    listener: TcpListener,
    files: TlsFiles,
    handle: Handle,
    router: Router,
    port: u16,
) -> Result<(), ServerError> {
    let config = RustlsConfig::from_pem_file(&files.cert_path, &files.key_path)
        .await
        .map_err(|e| ServerError::TlsConfig {
            port,
            message: e.to_string(),
        })?;

    axum_server::from_tcp_rustls(listener, config)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .map_err(|e| ServerError::ServeFailed {
            port,
            message: e.to_string(),
        })
}

// ============================================================================
// Failure Subscription
// ============================================================================

/// A route's view of its listener's failure channel
#[derive(Debug)]
pub struct ServerFailures {
    receiver: watch::Receiver<Option<ServerError>>,
    observed: Arc<AtomicBool>,
    delivery: FailureDelivery,
}

impl ServerFailures {
    /// Wait until the listener fails
    ///
    /// Under [`FailureDelivery::SingleObserver`] only the first subscriber to
    /// look at the failure receives it; every other subscriber waits forever.
    /// Cancel-safe.
    pub async fn wait(&mut self) -> ServerError {
        loop {
            let current = self.receiver.borrow_and_update().clone();
            if let Some(error) = current {
                match self.delivery {
                    FailureDelivery::Broadcast => return error,
                    FailureDelivery::SingleObserver => {
                        if !self.observed.swap(true, Ordering::AcqRel) {
                            return error;
                        }
                        return std::future::pending().await;
                    }
                }
            }

            if self.receiver.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

// ============================================================================
// Server Registry
// ============================================================================

/// Port-to-listener map
///
/// All access goes through one mutex so that concurrent activations on the
/// same port create exactly one listener.
#[derive(Debug)]
pub struct ServerRegistry {
    servers: Mutex<HashMap<u16, Arc<ActiveServer>>>,
    started: AtomicUsize,
    delivery: FailureDelivery,
    max_body_size: usize,
}

impl ServerRegistry {
    pub fn new(delivery: FailureDelivery, max_body_size: usize) -> Self {
        Self {
            servers: Mutex::new(HashMap::new()),
            started: AtomicUsize::new(0),
            delivery,
            max_body_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u16, Arc<ActiveServer>>> {
        self.servers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the listener for `port`, starting one if none exists
    ///
    /// `tls` is only consulted when the listener is created. Must be called
    /// from within a tokio runtime.
    pub fn ensure_server(&self, port: u16, tls: Option<TlsFiles>) -> Arc<ActiveServer> {
        let mut servers = self.lock();

        if let Some(server) = servers.get(&port) {
            if tls.is_some() && server.scheme() == Scheme::Plain {
                warn!(
                    port,
                    "port is already served over plain http, ignoring the route's TLS configuration"
                );
            }
            return Arc::clone(server);
        }

        let server = ActiveServer::start(port, tls, self.delivery, self.max_body_size);
        self.started.fetch_add(1, Ordering::SeqCst);
        servers.insert(port, Arc::clone(&server));
        server
    }

    pub fn get(&self, port: u16) -> Option<Arc<ActiveServer>> {
        self.lock().get(&port).cloned()
    }

    /// Multiplexer of the listener on `port`
    pub fn mux(&self, port: u16) -> Option<Arc<Mux>> {
        self.lock()
            .get(&port)
            .map(|server| Arc::clone(server.mux()))
    }

    pub fn contains(&self, port: u16) -> bool {
        self.lock().contains_key(&port)
    }

    /// Number of listeners created over the registry's lifetime
    pub fn servers_started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.lock().keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    /// Force-close the listener on `port`
    ///
    /// The entry stays in the registry; routes on the port observe the
    /// failure according to the delivery policy. Returns `false` if no
    /// listener exists for the port.
    pub fn shutdown_server(&self, port: u16) -> bool {
        match self.get(port) {
            Some(server) => {
                info!(port, "force closing http server");
                server.shutdown();
                true
            }
            None => false,
        }
    }

    /// Gracefully close every listener
    pub fn shutdown_all(&self, grace: Duration) {
        for server in self.lock().values() {
            server.graceful_shutdown(grace);
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;

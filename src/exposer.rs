//! Pull-based exposition of a [`Registry`] over HTTP.
//!
//! The exposer binds synchronously so a busy port is reported straight back to
//! the caller, then serves scrapes from its own thread running a
//! current-thread tokio runtime. That keeps it usable from plain threaded
//! programs and from inside an existing async runtime alike.

use std::{
    future::IntoFuture,
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use tokio::sync::oneshot;

use crate::{
    encoding,
    error::{Error, Result},
    registry::Registry,
};

pub const DEFAULT_ENDPOINT: &str = "0.0.0.0:8080";
pub const DEFAULT_PATH: &str = "/metrics";
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposerConfig {
    /// `host:port` to listen on. Port 0 picks an ephemeral port.
    pub endpoint: String,
    /// HTTP path scrapes are answered on.
    pub path: String,
    /// How long a stop waits for open connections before dropping them.
    pub grace_period: Duration,
}

impl Default for ExposerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            path: DEFAULT_PATH.to_string(),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl ExposerConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

/// A running scrape endpoint. Dropping it stops the server and waits for the
/// serving thread to exit.
#[derive(Debug)]
pub struct Exposer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Exposer {
    pub fn bind(config: &ExposerConfig, registry: Arc<Registry>) -> Result<Self> {
        if !config.path.starts_with('/') {
            return Err(Error::InvalidPath(config.path.clone()));
        }
        let bind_err = |source| Error::Bind {
            endpoint: config.endpoint.clone(),
            source,
        };
        let listener = StdTcpListener::bind(config.endpoint.as_str()).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        // Timers are required: axum backs off with a sleep after accept errors,
        // and stop bounds the graceful shutdown with one.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;
        let app = Router::new()
            .route(&config.path, get(scrape))
            .with_state(registry);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let grace_period = config.grace_period;

        let thread = std::thread::Builder::new()
            .name("metrics-exposer".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(listener) => listener,
                        Err(e) => {
                            tracing::error!(message = "failed to register exposer listener", error = %e);
                            return;
                        }
                    };
                    let (graceful_tx, graceful_rx) = oneshot::channel::<()>();
                    let serve = axum::serve(listener, app)
                        .with_graceful_shutdown(async move {
                            let _ = graceful_rx.await;
                        })
                        .into_future();
                    tokio::pin!(serve);
                    tokio::select! {
                        served = &mut serve => {
                            if let Err(e) = served {
                                tracing::error!(message = "exposer stopped with error", error = %e);
                            }
                            return;
                        }
                        _ = shutdown_rx => {}
                    }
                    let _ = graceful_tx.send(());
                    match tokio::time::timeout(grace_period, serve).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::error!(message = "exposer stopped with error", error = %e);
                        }
                        // Dropping the runtime below closes whatever is still open.
                        Err(_) => {
                            tracing::warn!(message = "exposer grace period expired, dropping open connections", grace_period = ?grace_period);
                        }
                    }
                })
            })
            .map_err(Error::Runtime)?;

        tracing::info!(message = "exposer listening", addr = %local_addr, path = %config.path);
        Ok(Self {
            local_addr,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop serving. In-flight scrapes get up to the configured grace period to
    /// finish, after which their connections are dropped.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(message = "exposer thread panicked", addr = %self.local_addr);
            } else {
                tracing::info!(message = "exposer stopped", addr = %self.local_addr);
            }
        }
    }
}

impl Drop for Exposer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn scrape(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let start = Instant::now();
    let families = registry.gather();
    let body = encoding::encode(&families);
    tracing::debug!(message = "rendered scrape", families = families.len(), bytes = body.len(), duration = ?start.elapsed());
    ([(header::CONTENT_TYPE, encoding::CONTENT_TYPE)], body)
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::TcpStream,
        sync::mpsc,
    };

    use super::*;
    use crate::family::Family;
    use crate::metrics::counter::Counter;

    fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(
            stream,
            "GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n"
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    fn localhost() -> ExposerConfig {
        ExposerConfig::default().with_endpoint("127.0.0.1:0")
    }

    #[test]
    fn serves_registry() {
        let registry = Arc::new(Registry::new());
        let family = Family::<Counter>::new("scraped_total", "Scraped things", &[]).unwrap();
        registry.register(family.collectable());
        family.add(&[("kind", "a")]).unwrap().incr_by(2.0);

        let exposer = Exposer::bind(&localhost(), registry).unwrap();
        let response = http_get(exposer.local_addr(), "/metrics");
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains("text/plain; version=0.0.4"));
        assert!(response.contains("# TYPE scraped_total counter"));
        assert!(response.contains("scraped_total{kind=\"a\"} 2"));

        let missing = http_get(exposer.local_addr(), "/nope");
        assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");
        exposer.stop();
    }

    #[test]
    fn custom_path() {
        let registry = Arc::new(Registry::new());
        let exposer = Exposer::bind(&localhost().with_path("/internal/metrics"), registry).unwrap();
        let response = http_get(exposer.local_addr(), "/internal/metrics");
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    }

    #[test]
    fn bind_failure_is_reported() {
        let taken = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = taken.local_addr().unwrap().to_string();
        let config = ExposerConfig::default().with_endpoint(endpoint);
        let err = Exposer::bind(&config, Arc::new(Registry::new())).unwrap_err();
        assert!(matches!(err, Error::Bind { .. }), "{err}");
    }

    #[test]
    fn bad_endpoint_and_path() {
        let registry = Arc::new(Registry::new());
        let config = ExposerConfig::default().with_endpoint("not an endpoint");
        assert!(matches!(
            Exposer::bind(&config, registry.clone()),
            Err(Error::Bind { .. })
        ));
        assert!(matches!(
            Exposer::bind(&localhost().with_path("metrics"), registry),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn stop_releases_port() {
        let exposer = Exposer::bind(&localhost(), Arc::new(Registry::new())).unwrap();
        let addr = exposer.local_addr();
        exposer.stop();
        assert!(TcpStream::connect(addr).is_err());
    }

    /// Opens a connection and sends a request without the terminating blank
    /// line, so the server keeps waiting for the rest of the headers.
    fn half_request(addr: SocketAddr) -> TcpStream {
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(stream, "GET /metrics HTTP/1.1\r\nHost: {addr}\r\n").unwrap();
        stream.flush().unwrap();
        stream
    }

    #[test]
    fn stop_with_half_sent_request() {
        let config = localhost().with_grace_period(Duration::from_millis(200));
        let exposer = Exposer::bind(&config, Arc::new(Registry::new())).unwrap();
        let addr = exposer.local_addr();
        let _client = half_request(addr);
        // Give the server a chance to accept and start reading the headers.
        std::thread::sleep(Duration::from_millis(100));

        let (done_tx, done_rx) = mpsc::channel();
        std::thread::spawn(move || {
            exposer.stop();
            done_tx.send(()).unwrap();
        });
        done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("stop did not return with a connection left open");
        assert!(TcpStream::connect(addr).is_err());
    }

    #[test]
    fn drop_with_half_sent_request() {
        let config = localhost().with_grace_period(Duration::from_millis(200));
        let exposer = Exposer::bind(&config, Arc::new(Registry::new())).unwrap();
        let _client = half_request(exposer.local_addr());
        std::thread::sleep(Duration::from_millis(100));

        let (done_tx, done_rx) = mpsc::channel();
        std::thread::spawn(move || {
            drop(exposer);
            done_tx.send(()).unwrap();
        });
        done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("drop did not return with a connection left open");
    }

    #[test]
    fn serves_while_a_client_stalls() {
        let exposer = Exposer::bind(&localhost(), Arc::new(Registry::new())).unwrap();
        let addr = exposer.local_addr();
        let _stalled = half_request(addr);
        let _idle = TcpStream::connect(addr).unwrap();
        let response = http_get(addr, "/metrics");
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    }
}

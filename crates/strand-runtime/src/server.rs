//! TCP/TLS transport and server lifecycle.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use strand_config::ServerConfig;

use crate::registry::Registry;
use crate::session::{Session, SessionContext};
use crate::telemetry::MetricsCollector;
use crate::{Error, Result};

/// The RPC server: one accept loop, one session task per connection,
/// graceful shutdown with a bounded drain.
pub struct RpcServer {
    config: ServerConfig,
    registry: Arc<Registry>,
    metrics: MetricsCollector,
    /// Drain signal: stops the accept loop and tells sessions to finish
    /// their current message and exit.
    shutdown: CancellationToken,
    /// Force-close signal: parent of every session's hard-cancel token.
    force: CancellationToken,
    sessions: TaskTracker,
    local_addr: OnceLock<SocketAddr>,
    shutting_down: AtomicBool,
}

impl RpcServer {
    pub fn new(config: ServerConfig, registry: Registry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            metrics: MetricsCollector::new(),
            shutdown: CancellationToken::new(),
            force: CancellationToken::new(),
            sessions: TaskTracker::new(),
            local_addr: OnceLock::new(),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// The bound address, available once `serve()` has bound the listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Bind the listener and accept connections until `shutdown()` fires.
    pub async fn serve(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind)
            .await
            .map_err(|e| Error::Listen {
                addr: self.config.bind.clone(),
                source: e,
            })?;
        let local = listener.local_addr().map_err(|e| Error::Listen {
            addr: self.config.bind.clone(),
            source: e,
        })?;
        let _ = self.local_addr.set(local);

        let tls = self.tls_acceptor()?;
        info!(addr = %local, tls = tls.is_some(), "server listening");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    self.spawn_session(socket, peer, tls.clone());
                }
            }
        }

        // Dropping the listener refuses new connections immediately; live
        // sessions drain under shutdown().
        drop(listener);
        debug!("accept loop stopped");
        Ok(())
    }

    fn spawn_session(&self, socket: TcpStream, peer: SocketAddr, tls: Option<TlsAcceptor>) {
        let ctx = SessionContext {
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
            default_timeout_ms: self.config.default_timeout_ms,
            shutdown: self.shutdown.clone(),
        };
        let token = self.force.child_token();

        self.sessions.spawn(async move {
            match tls {
                Some(acceptor) => match acceptor.accept(socket).await {
                    Ok(stream) => Session::new(stream, ctx, token, peer).run().await,
                    Err(e) => warn!(peer = %peer, error = %e, "TLS handshake failed"),
                },
                None => Session::new(socket, ctx, token, peer).run().await,
            }
        });
    }

    /// Graceful shutdown: stop accepting, let sessions finish their
    /// in-flight dispatch, force-close whatever is left after the drain
    /// window. Idempotent; concurrent calls are no-ops.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("shutting down");
        self.shutdown.cancel();
        self.sessions.close();

        let drain = Duration::from_millis(self.config.shutdown_timeout_ms);
        if tokio::time::timeout(drain, self.sessions.wait()).await.is_err() {
            warn!("drain window expired, force-closing remaining sessions");
            self.force.cancel();
            self.sessions.wait().await;
        }

        info!("shutdown complete");
    }

    fn tls_acceptor(&self) -> Result<Option<TlsAcceptor>> {
        let Some(tls) = &self.config.tls else {
            return Ok(None);
        };

        let certs = load_certs(&tls.cert_path)?;
        let key = load_private_key(&tls.key_path)?;

        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| Error::Tls(e.to_string()))?;

        Ok(Some(TlsAcceptor::from(Arc::new(config))))
    }
}

fn load_certs(path: &Path) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| Error::Tls(format!("failed to read {}: {}", path.display(), e)))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::Tls(format!("invalid certificate in {}: {}", path.display(), e)))?;
    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| Error::Tls(format!("failed to read {}: {}", path.display(), e)))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| Error::Tls(format!("invalid private key in {}: {}", path.display(), e)))?
        .ok_or_else(|| Error::Tls(format!("no private key found in {}", path.display())))
}

//! TCP Server
//!
//! Accepts connections and hands each to its own handler thread. The
//! accept loop is non-blocking so it can observe the shutdown flag;
//! connections past `maxConnections` are dropped immediately.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::error::{LodeError, Result};

use super::Connection;

/// TCP server for LodeDB
pub struct Server {
    db: Arc<Database>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    active_connections: Arc<AtomicUsize>,
}

impl Server {
    /// Bind the configured address; the listener exists from here on, so
    /// `local_addr` works before `run`
    pub fn bind(db: Arc<Database>) -> Result<Self> {
        let addr = db.config().listen_addr();
        let listener = TcpListener::bind(&addr)
            .map_err(|e| LodeError::Config(format!("cannot bind {}: {}", addr, e)))?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            db,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The bound address (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Flag that stops the accept loop; share it with a signal handler
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Accept loop (blocking); returns after shutdown is signaled and
    /// in-flight connections got a short drain window
    pub fn run(&self) -> Result<()> {
        let max_connections = self.db.config().max_connections;
        info!(addr = %self.local_addr()?, "server accepting connections");

        let mut next_id: u64 = 0;
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let current = self.active_connections.load(Ordering::Relaxed);
                    if current >= max_connections {
                        warn!(
                            peer = %addr,
                            current,
                            max = max_connections,
                            "connection limit reached; rejecting"
                        );
                        drop(stream);
                        continue;
                    }

                    next_id += 1;
                    self.spawn_handler(next_id, stream);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    if !self.shutdown.load(Ordering::Relaxed) {
                        error!(error = %e, "accept failed");
                    }
                }
            }
        }

        self.drain();
        Ok(())
    }

    fn spawn_handler(&self, id: u64, stream: std::net::TcpStream) {
        // Handler threads do blocking I/O
        if let Err(e) = stream.set_nonblocking(false) {
            warn!(error = %e, "cannot configure stream");
            return;
        }

        let db = self.db.clone();
        let active = self.active_connections.clone();
        active.fetch_add(1, Ordering::Relaxed);

        let spawned = thread::Builder::new()
            .name(format!("lodedb-conn-{}", id))
            .spawn(move || {
                match Connection::new(stream, db) {
                    Ok(mut conn) => {
                        if let Err(e) = conn.handle() {
                            debug!(peer = conn.peer_addr(), error = %e, "connection ended with error");
                        }
                    }
                    Err(e) => warn!(error = %e, "cannot set up connection"),
                }
                active.fetch_sub(1, Ordering::Relaxed);
            });

        if let Err(e) = spawned {
            error!(error = %e, "cannot spawn connection handler");
            self.active_connections.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Give in-flight statements a moment to finish after shutdown
    fn drain(&self) {
        info!("server draining connections");
        for _ in 0..50 {
            if self.active_connections.load(Ordering::Relaxed) == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        info!("server stopped");
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }
}

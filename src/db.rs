//! Database coordinator
//!
//! Owns the catalog and the process-wide WAL fsync ticker, and carries
//! the auth mode derived from the config. One instance per process,
//! shared by every connection.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, tick, Sender};
use crossbeam::select;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::{Config, WalFsync};
use crate::error::Result;

/// Process-wide database state
pub struct Database {
    config: Config,
    catalog: Arc<Catalog>,
    auth_enabled: bool,
    ticker: Mutex<Option<FsyncTicker>>,
}

struct FsyncTicker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Database {
    /// Open the database: bootstrap the catalog, install the configured
    /// admin (config wins over any stored password), start the fsync
    /// ticker if the policy is periodic
    pub fn open(config: Config) -> Result<Arc<Self>> {
        let catalog = Arc::new(Catalog::open(&config.data_dir, config.engine_config())?);

        let auth_enabled = match &config.auth {
            Some(auth) => {
                catalog.ensure_admin(&auth.username, &auth.password)?;
                true
            }
            None => false,
        };

        let ticker = if config.wal_fsync == WalFsync::Periodic {
            Some(spawn_fsync_ticker(
                catalog.clone(),
                config.wal_fsync_interval_ms,
            )?)
        } else {
            None
        };

        info!(
            data_dir = %config.data_dir.display(),
            auth = auth_enabled,
            "database open"
        );
        Ok(Arc::new(Self {
            config,
            catalog,
            auth_enabled,
            ticker: Mutex::new(ticker),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth_enabled
    }

    /// Stop the ticker and fsync every open WAL
    pub fn shutdown(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            let _ = ticker.stop.send(());
            let _ = ticker.handle.join();
        }
        for engine in self.catalog.open_engines() {
            if let Err(e) = engine.sync() {
                warn!(error = %e, "WAL sync failed during shutdown");
            }
        }
        info!("database shut down");
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One process-wide ticker drives the `periodic` fsync policy for every
/// open table engine
fn spawn_fsync_ticker(catalog: Arc<Catalog>, interval_ms: u64) -> Result<FsyncTicker> {
    let (stop, stopped) = bounded::<()>(1);
    let ticks = tick(Duration::from_millis(interval_ms.max(1)));

    let handle = std::thread::Builder::new()
        .name("lodedb-wal-fsync".to_string())
        .spawn(move || loop {
            select! {
                recv(ticks) -> _ => {
                    for engine in catalog.open_engines() {
                        if let Err(e) = engine.wal_tick() {
                            warn!(error = %e, "periodic WAL fsync failed");
                        }
                    }
                }
                recv(stopped) -> _ => break,
            }
        })
        .map_err(|e| crate::error::LodeError::Internal(format!("cannot spawn ticker: {}", e)))?;

    Ok(FsyncTicker { stop, handle })
}

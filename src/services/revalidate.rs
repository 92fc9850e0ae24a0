//! Periodic pool re-validation
//!
//! Re-probes every stored proxy on an interval. A proxy that still answers
//! on at least one scheme gets its fields refreshed and its score restored;
//! a proxy that answers on neither loses a point, down to eviction at zero.
//! The store itself never re-validates: this service is the only caller of
//! `reset_score`/`penalize` inside this process.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, instrument, warn};

use futures::stream::{self, StreamExt};
use futures::TryStreamExt;

use crate::database::Database;
use crate::error::Result;
use crate::models::Protocol;
use crate::repository::ProxyRepository;
use crate::validator::Validator;

/// Re-validation service configuration
#[derive(Clone)]
pub struct RevalidateConfig {
    /// Interval between re-validation rounds
    pub check_interval: Duration,
    /// Score restored on a successful re-validation
    pub max_score: i32,
}

impl Default for RevalidateConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(600),
            max_score: 50,
        }
    }
}

/// Periodic re-validation service for the stored pool
pub struct RevalidateService {
    db: Database,
    validator: Validator,
    config: RevalidateConfig,
}

impl RevalidateService {
    pub fn new(db: Database, validator: Validator, config: RevalidateConfig) -> Self {
        Self {
            db,
            validator,
            config,
        }
    }

    /// Run the re-validation service (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting re-validation service with {}s interval",
            self.config.check_interval.as_secs()
        );

        let mut ticker = interval(self.config.check_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.revalidate_all().await {
                        error!("Re-validation round failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Re-validation service shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Probe every stored proxy and feed the outcomes back into the store.
    ///
    /// Each proxy's outcome is written as soon as its probe finishes, and
    /// only through the narrow store operations (`record_probe`,
    /// `reset_score`, `penalize`). Consumer writes landing mid-round, a
    /// `disable_domain` or a `penalize`, survive the round untouched.
    #[instrument(skip(self))]
    async fn revalidate_all(&self) -> Result<()> {
        let repo = ProxyRepository::new(self.db.pool().clone());
        let records: Vec<_> = repo.stream_all().try_collect().await?;

        info!("Re-validating {} proxies", records.len());

        let results: Vec<bool> = stream::iter(records)
            .map(|record| {
                let repo = repo.clone();
                async move {
                    let outcome = self.validator.probe(&record.ip, record.port as u16).await;
                    let usable = outcome.protocol != Protocol::Unknown;

                    let applied = if usable {
                        match repo.record_probe(&record.ip, &outcome).await {
                            Ok(_) => repo
                                .reset_score(&record.ip, self.config.max_score)
                                .await
                                .map(|_| ()),
                            Err(e) => Err(e),
                        }
                    } else {
                        repo.penalize(&record.ip, 1).await.map(|_| ())
                    };

                    if let Err(e) = applied {
                        warn!("Failed to record outcome for {}: {}", record.address(), e);
                    }

                    usable
                }
            })
            .buffer_unordered(self.validator.workers())
            .collect()
            .await;

        let usable = results.iter().filter(|&&ok| ok).count();

        info!(
            "Re-validation complete: {} usable, {} unusable",
            usable,
            results.len() - usable
        );

        Ok(())
    }
}

/// Handle for managing the re-validation service lifecycle
pub struct RevalidateHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl RevalidateHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for RevalidateHandle {
    fn default() -> Self {
        Self::new().0
    }
}

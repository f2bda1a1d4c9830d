//! Retention manager for pruning finished jobs.

use crate::db::Store;

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

/// Deletes terminal jobs once they are older than the retention period.
pub struct RetentionManager {
    store: Arc<Store>,
    retention: Duration,
    stop: Arc<Mutex<Option<tokio::sync::broadcast::Sender<()>>>>,
}

impl RetentionManager {
    pub fn new(store: Arc<Store>, retention: Duration) -> Self {
        Self {
            store,
            retention,
            stop: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the retention manager background task.
    pub fn start(&self) {
        let store = self.store.clone();
        let retention = self.retention;
        let stop = self.stop.clone();

        tokio::spawn(async move {
            let (tx, _) = tokio::sync::broadcast::channel(1);
            {
                let mut stop_guard = stop.lock().await;
                *stop_guard = Some(tx.clone());
            }

            let mut rx = tx.subscribe();
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);

            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        prune_jobs(&store, retention);
                    }
                }
            }
        });
    }

    /// Stop the retention manager.
    pub async fn stop(&self) {
        let stop = self.stop.lock().await;
        if let Some(tx) = stop.as_ref() {
            let _ = tx.send(());
        }
    }
}

fn prune_jobs(store: &Store, retention: Duration) {
    let Ok(retention) = ChronoDuration::from_std(retention) else {
        return;
    };
    let cutoff = Utc::now() - retention;

    match store.delete_finished_jobs_before(cutoff) {
        Ok(0) => {}
        Ok(n) => tracing::info!("RetentionManager: pruned {} finished jobs", n),
        Err(e) => tracing::error!("RetentionManager: Failed to prune jobs: {}", e),
    }
}

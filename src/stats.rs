use crate::api_client::ApiClient;
use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::models::{AdminStatsSnapshot, UserType};
use crate::session::SessionStore;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Polls `GET /admin/stats` for the admin dashboard.
///
/// Ticks are skipped while the signed-in user is not an admin. The poller
/// stops on session teardown, or when the backend answers 401/403.
pub struct AdminStatsPoller {
    api: ApiClient,
    interval: Duration,
    latest: watch::Sender<Option<AdminStatsSnapshot>>,
}

impl AdminStatsPoller {
    pub fn new(api: ApiClient, interval: Duration) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            api,
            interval,
            latest,
        }
    }

    /// Poller using `ADMIN_STATS_INTERVAL_SECS` from the loaded config.
    pub fn from_config(api: ApiClient, config: &Config) -> Self {
        Self::new(api, config.admin_stats_interval())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AdminStatsSnapshot>> {
        self.latest.subscribe()
    }

    pub fn latest(&self) -> Option<AdminStatsSnapshot> {
        self.latest.borrow().clone()
    }

    pub async fn fetch_once(&self) -> Result<AdminStatsSnapshot, AppError> {
        let stats = self
            .api
            .admin_stats()
            .await
            .context("Failed to refresh admin stats")?;
        let snapshot = AdminStatsSnapshot {
            stats,
            fetched_at: Utc::now(),
        };
        self.latest.send_replace(Some(snapshot.clone()));
        Ok(snapshot)
    }

    pub async fn run(self, session: SessionStore) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = session.shutdown_signal();

        tracing::info!("Admin stats poller started ({:?} interval)", self.interval);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            let is_admin = session
                .current()
                .user
                .map(|u| u.user_type == UserType::Admin)
                .unwrap_or(false);
            if !is_admin {
                continue;
            }

            match self.fetch_once().await {
                Ok(snapshot) => {
                    tracing::debug!("Admin stats refreshed: {:?}", snapshot.stats);
                }
                Err(e) => match e.root() {
                    AppError::AuthExpired | AppError::Forbidden(_) => {
                        tracing::warn!("Stopping admin stats poller: {}", e);
                        break;
                    }
                    _ => tracing::warn!("Admin stats fetch failed: {}", e),
                },
            }
        }
        tracing::info!("Admin stats poller stopped");
    }

    pub fn spawn(self, session: SessionStore) -> JoinHandle<()> {
        tokio::spawn(self.run(session))
    }
}

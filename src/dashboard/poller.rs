//! Fixed-interval snapshot polling for the live dashboard.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::store::SharedStateStore;
use super::view::DashboardView;

/// Poll the store every `interval` and publish the derived view.
///
/// `None` means no active session. The task stops once every receiver is
/// dropped.
pub fn spawn_poller(
    store: Arc<SharedStateStore>,
    interval: Duration,
) -> (watch::Receiver<Option<DashboardView>>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = watch::channel(None);
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let snapshot = match store.blocking(|s| Ok(s.read())).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(error = %e, "Dashboard poll failed");
                    None
                }
            };
            let view = snapshot.as_ref().map(DashboardView::from_state);
            if tx.send(view).is_err() {
                tracing::debug!("Dashboard poller has no receivers, stopping");
                break;
            }
        }
    });
    (rx, handle)
}

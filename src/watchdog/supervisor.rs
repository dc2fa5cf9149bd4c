//! Restart-on-panic wrapper for the long-running loops

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// A run this long resets the backoff
const HEALTHY_RUN: Duration = Duration::from_secs(60);

/// Run `factory()` in its own task until it returns normally or shutdown is
/// signalled. A panic restarts it after a backoff of 1s doubling to 30s.
pub async fn supervise<F, Fut>(name: &'static str, mut shutdown: watch::Receiver<bool>, factory: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let started = Instant::now();
        match tokio::spawn(factory()).await {
            Ok(()) => return,
            Err(e) if e.is_panic() => {
                error!("[SUPERVISOR] {} panicked after {:?}", name, started.elapsed());
            }
            Err(_) => {
                warn!("[SUPERVISOR] {} was cancelled", name);
                return;
            }
        }

        if *shutdown.borrow() {
            return;
        }
        if started.elapsed() >= HEALTHY_RUN {
            backoff = INITIAL_BACKOFF;
        }

        warn!("[SUPERVISOR] Restarting {} in {:?}", name, backoff);
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.changed() => {
                info!("[SUPERVISOR] {} not restarted, shutting down", name);
                return;
            }
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::info;

use reviewgate_core::LockManager;

/// Drops expired leases on a fixed interval.
///
/// Expiry is already enforced lazily on acquire and verify; the sweep only
/// keeps the lease table and the list view's lock overlay tidy.
pub async fn lock_sweep_loop(locks: Arc<LockManager>, every: Duration) {
    let mut interval = interval(every);

    loop {
        interval.tick().await;
        sweep_once(&locks);
    }
}

pub fn sweep_once(locks: &LockManager) -> usize {
    let removed = locks.sweep_expired();
    if removed > 0 {
        info!("Swept {} expired lock(s)", removed);
    }
    removed
}

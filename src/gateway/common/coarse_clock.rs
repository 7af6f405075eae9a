use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::Relaxed;

use tokio::time::{interval, Instant, Duration};

const COARSE_CLOCK_GRANULARITY_SECONDS: u64 = 1;

/// A global, shared atomic clock advanced by `coarse_monotonic_clock_updater`.
static COARSE_CLOCK: AtomicU32 = AtomicU32::new(0);

/// Returns the current value of the clock, roughly accurate to
/// COARSE_CLOCK_GRANULARITY_SECONDS. Used for lease/idle-timeout bookkeeping
/// where a precise `Instant::now()` call on every message would be wasteful.
pub fn coarse_monotonic_now() -> u32 {
    COARSE_CLOCK.load(Relaxed)
}

fn update_coarse_monotonic_clock() {
    static mut START: Option<Instant> = None;

    // Safety: only the updater task calls this, never concurrently.
    unsafe {
        match START {
            Some(start) => {
                COARSE_CLOCK.store(start.elapsed().as_secs() as u32, Relaxed);
            }
            None => {
                START = Some(Instant::now());
            }
        }
    }
}

/// An infinite async task that updates the clock every
/// COARSE_CLOCK_GRANULARITY_SECONDS seconds. Spawned once at startup.
pub async fn coarse_monotonic_clock_updater() {
    let mut interval = interval(Duration::from_secs(COARSE_CLOCK_GRANULARITY_SECONDS));
    loop {
        interval.tick().await;
        update_coarse_monotonic_clock();
    }
}

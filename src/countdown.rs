use std::time::Duration;

use tokio::task::JoinHandle;

const TICK: Duration = Duration::from_secs(1);

/// Progress estimate that counts down once per second and holds at 1.
///
/// The ticking task is aborted when the handle is dropped, so no tick is
/// delivered once the owner's scope has been left, whatever the exit path.
pub struct Countdown {
    ticker: JoinHandle<()>,
}

impl Countdown {
    /// Starts ticking from `initial` (clamped to at least 1). `on_tick` receives
    /// every new value; it is not called again once the floor has been reached.
    pub fn start<F>(initial: u32, on_tick: F) -> Self
    where
        F: Fn(u32) + Send + 'static,
    {
        let mut remaining = initial.max(1);

        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + TICK, TICK);
            while remaining > 1 {
                interval.tick().await;
                remaining -= 1;
                on_tick(remaining);
            }
        });

        Self { ticker }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

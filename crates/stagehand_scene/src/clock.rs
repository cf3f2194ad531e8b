//! Tick sources driving placement sampling

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// One sample point of the shared clock
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Tick {
    /// Seconds since the previous tick
    pub delta_secs: f32,
    /// Time since the clock started
    pub elapsed: Duration,
    /// Monotonic tick counter, starting at 1 for the first published tick
    pub frame: u64,
}

/// A source of periodic ticks.
///
/// Ticks are published on a watch channel: samplers that fall behind observe
/// only the latest tick, which is exactly what placement sampling wants.
pub trait Clock: Send + Sync {
    fn ticks(&self) -> watch::Receiver<Tick>;
}

/// Clock driven by a tokio interval task
pub struct IntervalClock {
    rx: watch::Receiver<Tick>,
    driver: JoinHandle<()>,
}

impl IntervalClock {
    /// Start publishing ticks every `period`
    pub fn start(period: Duration) -> Self {
        let (tx, rx) = watch::channel(Tick::default());
        let driver = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick of a tokio interval fires immediately; skip it
            // so delta accounting starts from a full period.
            interval.tick().await;
            let mut frame = 0u64;
            let mut elapsed = Duration::ZERO;
            loop {
                interval.tick().await;
                frame += 1;
                elapsed += period;
                let tick = Tick {
                    delta_secs: period.as_secs_f32(),
                    elapsed,
                    frame,
                };
                if tx.send(tick).is_err() {
                    break;
                }
            }
        });
        Self { rx, driver }
    }
}

impl Clock for IntervalClock {
    fn ticks(&self) -> watch::Receiver<Tick> {
        self.rx.clone()
    }
}

impl Drop for IntervalClock {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Clock advanced explicitly, for tests and lockstep drivers
pub struct ManualClock {
    tx: watch::Sender<Tick>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Tick::default());
        Self { tx }
    }

    /// Publish the next tick, `delta_secs` after the previous one
    pub fn advance(&self, delta_secs: f32) {
        self.tx.send_modify(|tick| {
            tick.frame += 1;
            tick.delta_secs = delta_secs;
            tick.elapsed += Duration::from_secs_f32(delta_secs);
        });
    }
}

impl Clock for ManualClock {
    fn ticks(&self) -> watch::Receiver<Tick> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_publishes_advances() {
        let clock = ManualClock::new();
        let mut ticks = clock.ticks();
        clock.advance(0.016);
        ticks.changed().await.unwrap();
        let tick = *ticks.borrow_and_update();
        assert_eq!(tick.frame, 1);
        assert!((tick.delta_secs - 0.016).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_manual_clock_coalesces_for_slow_samplers() {
        let clock = ManualClock::new();
        let mut ticks = clock.ticks();
        clock.advance(0.01);
        clock.advance(0.01);
        clock.advance(0.01);
        ticks.changed().await.unwrap();
        assert_eq!(ticks.borrow_and_update().frame, 3, "only the latest tick is observed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_clock_counts_frames() {
        let clock = IntervalClock::start(Duration::from_millis(10));
        let mut ticks = clock.ticks();
        ticks.changed().await.unwrap();
        let first = *ticks.borrow_and_update();
        assert_eq!(first.frame, 1);
        ticks.changed().await.unwrap();
        let second = *ticks.borrow_and_update();
        assert!(second.frame > first.frame);
        assert!(second.elapsed > first.elapsed);
    }
}

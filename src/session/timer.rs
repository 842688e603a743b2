//! Periodic elapsed-time publisher.
//!
//! The tick task never touches session fields. It gets an immutable
//! `ElapsedBasis` snapshot at start and publishes the derived duration
//! through a `watch` channel, which is the only state shared with the
//! control flow.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::clock::Clock;

/// Start instant plus pause time accumulated before this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElapsedBasis {
    pub started_at: Instant,
    pub paused: Duration,
}

impl ElapsedBasis {
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
            .saturating_sub(self.paused)
    }
}

/// `hh:mm:ss`, hours not wrapped at 24.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

pub struct ElapsedTimer {
    interval: Duration,
    clock: Arc<dyn Clock>,
    tx: Arc<watch::Sender<Duration>>,
    task: Option<JoinHandle<()>>,
}

impl ElapsedTimer {
    pub fn new(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let (tx, _) = watch::channel(Duration::ZERO);
        Self {
            interval,
            clock,
            tx: Arc::new(tx),
            task: None,
        }
    }

    /// Starts ticking from `basis`. A running tick task is stopped first,
    /// so there is never more than one. Must be called inside a tokio
    /// runtime.
    pub fn start(&mut self, basis: ElapsedBasis) {
        self.stop();

        let tx = Arc::clone(&self.tx);
        let clock = Arc::clone(&self.clock);
        let period = self.interval;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tx.send_replace(basis.elapsed_at(clock.now()));
            }
        }));
    }

    /// Stops ticking and keeps the last published value. No-op when idle.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Stops ticking and publishes zero.
    pub fn reset(&mut self) {
        self.stop();
        self.tx.send_replace(Duration::ZERO);
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn subscribe(&self) -> watch::Receiver<Duration> {
        self.tx.subscribe()
    }

    /// Last published value.
    pub fn current(&self) -> Duration {
        *self.tx.borrow()
    }
}

impl Drop for ElapsedTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::clock::ManualClock;

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(20)), "00:00:20");
        assert_eq!(format_elapsed(Duration::from_millis(3_725_900)), "01:02:05");
        assert_eq!(format_elapsed(Duration::from_secs(100 * 3600)), "100:00:00");
    }

    #[test]
    fn basis_subtracts_pauses() {
        let t0 = Instant::now();
        let basis = ElapsedBasis {
            started_at: t0,
            paused: Duration::from_secs(30),
        };
        assert_eq!(basis.elapsed_at(t0 + Duration::from_secs(50)), Duration::from_secs(20));
        assert_eq!(basis.elapsed_at(t0 + Duration::from_secs(10)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_each_tick() {
        let clock = Arc::new(ManualClock::new());
        let mut timer = ElapsedTimer::new(Duration::from_secs(1), clock.clone());
        let mut rx = timer.subscribe();

        timer.start(ElapsedBasis {
            started_at: clock.now(),
            paused: Duration::ZERO,
        });
        assert!(timer.is_running());

        clock.advance(Duration::from_secs(5));
        rx.changed().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(timer.current(), Duration::from_secs(5));

        timer.stop();
        assert!(!timer.is_running());
        assert_eq!(timer.current(), Duration::from_secs(5));

        timer.reset();
        assert_eq!(timer.current(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_the_previous_run() {
        let clock = Arc::new(ManualClock::new());
        let t0 = clock.now();
        clock.advance(Duration::from_secs(10));
        let mut timer = ElapsedTimer::new(Duration::from_secs(1), clock.clone());
        let mut rx = timer.subscribe();

        timer.start(ElapsedBasis {
            started_at: t0,
            paused: Duration::ZERO,
        });
        timer.start(ElapsedBasis {
            started_at: t0,
            paused: Duration::from_secs(4),
        });

        for _ in 0..3 {
            rx.changed().await.unwrap();
            assert_eq!(*rx.borrow_and_update(), Duration::from_secs(6));
        }

        timer.stop();
        timer.stop();
        assert!(!timer.is_running());
    }
}

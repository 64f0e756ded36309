// Per-tick timing statistics and frame budget overruns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct RateSample {
    at: Instant,
    ticks: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub over_budget: u64,
    pub last_tick_ms: f64,
    pub mean_tick_ms: f64,
    pub mean_sample_ms: f64,
    pub mean_decode_ms: f64,
    /// Ticks per second since the previous snapshot.
    pub fps: f64,
}

pub struct FrameStats {
    budget: Option<Duration>,
    ticks: AtomicU64,
    failed_ticks: AtomicU64,
    over_budget: AtomicU64,
    decodes: AtomicU64,
    last_tick_us: AtomicU64,
    tick_us_total: AtomicU64,
    sample_us_total: AtomicU64,
    decode_us_total: AtomicU64,
    last_sample: Mutex<RateSample>,
}

impl FrameStats {
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            budget,
            ticks: AtomicU64::new(0),
            failed_ticks: AtomicU64::new(0),
            over_budget: AtomicU64::new(0),
            decodes: AtomicU64::new(0),
            last_tick_us: AtomicU64::new(0),
            tick_us_total: AtomicU64::new(0),
            sample_us_total: AtomicU64::new(0),
            decode_us_total: AtomicU64::new(0),
            last_sample: Mutex::new(RateSample {
                at: Instant::now(),
                ticks: 0,
            }),
        }
    }

    /// Record a completed tick. Returns `true` if it exceeded the frame budget.
    pub fn record_tick(&self, total: Duration, sample: Duration) -> bool {
        let us = total.as_micros() as u64;
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.last_tick_us.store(us, Ordering::Relaxed);
        self.tick_us_total.fetch_add(us, Ordering::Relaxed);
        self.sample_us_total
            .fetch_add(sample.as_micros() as u64, Ordering::Relaxed);

        let over = self.budget.is_some_and(|b| total > b);
        if over {
            self.over_budget.fetch_add(1, Ordering::Relaxed);
        }
        over
    }

    pub fn record_decode(&self, elapsed: Duration) {
        self.decodes.fetch_add(1, Ordering::Relaxed);
        self.decode_us_total
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let now = Instant::now();
        let ticks = self.ticks.load(Ordering::Relaxed);
        let decodes = self.decodes.load(Ordering::Relaxed);

        let fps = {
            let mut sample = self.last_sample.lock();
            let elapsed = now.duration_since(sample.at).as_secs_f64();
            let fps = if elapsed > 0.1 {
                (ticks - sample.ticks) as f64 / elapsed
            } else {
                0.0
            };
            sample.at = now;
            sample.ticks = ticks;
            fps
        };

        let mean_ms = |total: &AtomicU64, count: u64| {
            if count > 0 {
                total.load(Ordering::Relaxed) as f64 / count as f64 / 1000.0
            } else {
                0.0
            }
        };

        StatsSnapshot {
            ticks,
            failed_ticks: self.failed_ticks.load(Ordering::Relaxed),
            over_budget: self.over_budget.load(Ordering::Relaxed),
            last_tick_ms: self.last_tick_us.load(Ordering::Relaxed) as f64 / 1000.0,
            mean_tick_ms: mean_ms(&self.tick_us_total, ticks),
            mean_sample_ms: mean_ms(&self.sample_us_total, ticks),
            mean_decode_ms: mean_ms(&self.decode_us_total, decodes),
            fps,
        }
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(None)
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic clock the controller measures phases and reaction times with.
pub trait Timer: Clone + Send + Sync {
    /// Nanoseconds since the timer was created.
    fn now(&self) -> u64;
    fn elapsed(&self, since: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(since))
    }
    fn sleep(&self, d: Duration);
    fn record_tick(&mut self, d: Duration);
    fn tick_stats(&self) -> TickStats;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickStats {
    pub ticks: usize,
    pub average_tick_ns: f64,
    pub jitter_ns: f64,
    pub max_tick_ns: f64,
}

impl TickStats {
    fn from_samples(samples: &[Duration]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let times: Vec<f64> = samples.iter().map(|d| d.as_nanos() as f64).collect();
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        Self {
            ticks: times.len(),
            average_tick_ns: avg,
            jitter_ns: var.sqrt(),
            max_tick_ns: times.iter().cloned().fold(0.0, f64::max),
        }
    }
}

fn push_bounded(samples: &mut Vec<Duration>, max: usize, d: Duration) {
    if samples.len() >= max {
        samples.remove(0);
    }
    samples.push(d);
}

#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
    pub tick_times: Vec<Duration>,
    pub max_samples: usize,
}

impl Timer for HighPrecisionTimer {
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
    fn record_tick(&mut self, d: Duration) {
        push_bounded(&mut self.tick_times, self.max_samples, d);
    }
    fn tick_stats(&self) -> TickStats {
        TickStats::from_samples(&self.tick_times)
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            tick_times: Vec::with_capacity(1000),
            max_samples: 1000,
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "linux")]
        sleep_monotonic(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }
}

/// Sleeps until an absolute monotonic deadline, resuming after signal interrupts.
#[cfg(target_os = "linux")]
fn sleep_monotonic(duration: Duration) {
    use libc::{
        c_long, clock_gettime, clock_nanosleep, time_t, timespec, CLOCK_MONOTONIC, EINTR,
        TIMER_ABSTIME,
    };

    const NANOS_PER_SEC: c_long = 1_000_000_000;

    let mut now = timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: `now` is a valid out-pointer for the duration of the call.
    if unsafe { clock_gettime(CLOCK_MONOTONIC, &mut now) } != 0 {
        std::thread::sleep(duration);
        return;
    }

    let secs = time_t::try_from(duration.as_secs()).unwrap_or(time_t::MAX);
    let nanos = now.tv_nsec + duration.subsec_nanos() as c_long;
    let deadline = timespec {
        tv_sec: now
            .tv_sec
            .saturating_add(secs)
            .saturating_add((nanos / NANOS_PER_SEC) as time_t),
        tv_nsec: nanos % NANOS_PER_SEC,
    };

    loop {
        // SAFETY: `deadline` outlives the call and a null remainder pointer is allowed.
        let rc = unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, TIMER_ABSTIME, &deadline, std::ptr::null_mut())
        };
        if rc != EINTR {
            break;
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    now_ns: Arc<AtomicU64>,
    tick_times: Vec<Duration>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now_ns.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Timer for ManualTimer {
    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
    fn record_tick(&mut self, d: Duration) {
        push_bounded(&mut self.tick_times, 1000, d);
    }
    fn tick_stats(&self) -> TickStats {
        TickStats::from_samples(&self.tick_times)
    }
}

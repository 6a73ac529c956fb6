//! Wall-clock timing for harness runs.

use std::time::{Duration, Instant};

pub struct RunTimer {
    started: Instant,
}

impl RunTimer {
    pub fn start() -> Self {
        Self { started: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn tuples_per_sec(&self, num_tuples: u64) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs == 0.0 {
            f64::INFINITY
        } else {
            num_tuples as f64 / secs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn reports_a_positive_throughput_after_some_elapsed_time() {
        let timer = RunTimer::start();
        sleep(Duration::from_millis(5));
        assert!(timer.elapsed().as_millis() >= 5);
        assert!(timer.tuples_per_sec(1000) > 0.0);
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 处理节流: 两次被接受的处理之间至少间隔 `min_interval`

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub struct Throttle {
    min_interval: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// 距上次接受不足间隔则拒绝; 接受时记录当前时刻
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = *last {
            if now.saturating_duration_since(prev) < self.min_interval {
                return false;
            }
        }
        *last = Some(now);
        true
    }
}

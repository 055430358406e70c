//! Load-shedding ladder. When frames keep missing their time budget the
//! pipeline gives up quality in fixed steps, and climbs back up once it
//! runs on budget again:
//!
//!   level 0: full quality
//!   level 1: skip the enhancer pass
//!   level 2: additionally decimate input (drop alternate frames)
//!
//! The level is a single atomic so the decode thread and every worker
//! can read it without locking; bookkeeping happens on the collector
//! thread only.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use crate::shared::constants::{DEFAULT_FRAMES_TO_RECOVER, DEFAULT_MISSES_TO_DEGRADE};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DegradationLevel {
    Full = 0,
    SkipEnhancer = 1,
    DecimateInput = 2,
}

impl DegradationLevel {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => DegradationLevel::Full,
            1 => DegradationLevel::SkipEnhancer,
            _ => DegradationLevel::DecimateInput,
        }
    }
}

struct Streaks {
    consecutive_misses: usize,
    consecutive_on_budget: usize,
}

pub struct DegradationController {
    level: AtomicU8,
    streaks: Mutex<Streaks>,
    misses_to_degrade: usize,
    frames_to_recover: usize,
}

impl DegradationController {
    pub fn new(misses_to_degrade: usize, frames_to_recover: usize) -> Self {
        Self {
            level: AtomicU8::new(0),
            streaks: Mutex::new(Streaks {
                consecutive_misses: 0,
                consecutive_on_budget: 0,
            }),
            misses_to_degrade: misses_to_degrade.max(1),
            frames_to_recover: frames_to_recover.max(1),
        }
    }

    pub fn level(&self) -> DegradationLevel {
        DegradationLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    pub fn skip_enhancer(&self) -> bool {
        self.level() >= DegradationLevel::SkipEnhancer
    }

    pub fn decimate_input(&self) -> bool {
        self.level() >= DegradationLevel::DecimateInput
    }

    /// Feeds one finished frame's deadline verdict. Returns the new
    /// level when this frame caused a transition.
    pub fn record_frame(&self, missed_deadline: bool) -> Option<DegradationLevel> {
        let mut streaks = self.streaks.lock().unwrap();
        let current = self.level.load(Ordering::Relaxed);

        if missed_deadline {
            streaks.consecutive_on_budget = 0;
            streaks.consecutive_misses += 1;
            if streaks.consecutive_misses >= self.misses_to_degrade && current < 2 {
                streaks.consecutive_misses = 0;
                self.level.store(current + 1, Ordering::Relaxed);
                return Some(DegradationLevel::from_u8(current + 1));
            }
        } else {
            streaks.consecutive_misses = 0;
            streaks.consecutive_on_budget += 1;
            if streaks.consecutive_on_budget >= self.frames_to_recover && current > 0 {
                streaks.consecutive_on_budget = 0;
                self.level.store(current - 1, Ordering::Relaxed);
                return Some(DegradationLevel::from_u8(current - 1));
            }
        }
        None
    }
}

impl Default for DegradationController {
    fn default() -> Self {
        Self::new(DEFAULT_MISSES_TO_DEGRADE, DEFAULT_FRAMES_TO_RECOVER)
    }
}

//! Shared pipeline counters, updated lock-free from every thread and
//! snapshotted for logging and shutdown reports.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct PipelineStats {
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    frames_dropped: AtomicU64,
    frames_repeated: AtomicU64,
    regions_swapped: AtomicU64,
    regions_skipped: AtomicU64,
    deadline_misses: AtomicU64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_in: u64,
    pub frames_out: u64,
    pub frames_dropped: u64,
    pub frames_repeated: u64,
    pub regions_swapped: u64,
    pub regions_skipped: u64,
    pub deadline_misses: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame_in(&self) {
        self.frames_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_out(&self) {
        self.frames_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: u64) {
        self.frames_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_repeated(&self) {
        self.frames_repeated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_region_swapped(&self) {
        self.regions_swapped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_region_skipped(&self) {
        self.regions_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deadline_miss(&self) {
        self.deadline_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_out: self.frames_out.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_repeated: self.frames_repeated.load(Ordering::Relaxed),
            regions_swapped: self.regions_swapped.load(Ordering::Relaxed),
            regions_skipped: self.regions_skipped.load(Ordering::Relaxed),
            deadline_misses: self.deadline_misses.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    pub fn describe(&self) -> String {
        format!(
            "in={} out={} dropped={} repeated={} swapped={} skipped={} deadline_misses={}",
            self.frames_in,
            self.frames_out,
            self.frames_dropped,
            self.frames_repeated,
            self.regions_swapped,
            self.regions_skipped,
            self.deadline_misses,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_accumulate() {
        let stats = PipelineStats::new();
        stats.record_frame_in();
        stats.record_frame_in();
        stats.record_frame_out();
        stats.record_dropped(3);
        stats.record_region_skipped();

        let snap = stats.snapshot();
        assert_eq!(snap.frames_in, 2);
        assert_eq!(snap.frames_out, 1);
        assert_eq!(snap.frames_dropped, 3);
        assert_eq!(snap.regions_skipped, 1);
        assert_eq!(snap.frames_repeated, 0);
    }

    #[test]
    fn test_concurrent_updates() {
        let stats = Arc::new(PipelineStats::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_frame_in();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.snapshot().frames_in, 4000);
    }

    #[test]
    fn test_describe_mentions_every_counter() {
        let stats = PipelineStats::new();
        stats.record_deadline_miss();
        let text = stats.snapshot().describe();
        assert!(text.contains("deadline_misses=1"));
        assert!(text.contains("dropped=0"));
    }
}

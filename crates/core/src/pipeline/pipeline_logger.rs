use std::collections::HashMap;
use std::time::Instant;

/// Cross-cutting logger for pipeline orchestration events.
///
/// Decouples the use case from specific output mechanisms (stdout, log
/// crate, test capture) so each caller can observe pipeline behavior
/// without changing the orchestration code.
pub trait PipelineLogger: Send {
    /// Report frame-level progress. A live stream has no known total,
    /// so this is just the running output count.
    fn progress(&mut self, frames_out: u64);

    /// Record how long a named pipeline stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. queue depth, region count).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-pipeline summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events. Used by tests where logger
/// output is irrelevant.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _frames_out: u64) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// CLI-oriented logger that tracks per-stage timing, metrics, and
/// provides a summary report when the stream ends.
///
/// Progress output is throttled to every `throttle_frames` frames
/// to avoid flooding the log on long-running streams.
pub struct StdoutPipelineLogger {
    throttle_frames: u64,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    frames_out: u64,
    messages: Vec<String>,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: u64) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            frames_out: 0,
            messages: Vec::new(),
        }
    }

    /// Returns the formatted summary string, or `None` if no data recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() && self.frames_out == 0 {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.frames_out;
        let mut lines = Vec::new();

        lines.push(format!(
            "Stream summary ({frames} frames, {:.1}s total):",
            elapsed_ms / 1000.0
        ));

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = if durations.is_empty() {
                0.0
            } else {
                total_ms / durations.len() as f64
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms"
            ));
        }

        let mut metric_names: Vec<_> = self.metrics.keys().collect();
        metric_names.sort();
        for name in metric_names {
            let values = &self.metrics[name];
            let avg = if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            };
            lines.push(format!("  {name}: avg {avg:.1}"));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    /// Returns the timing data for a given stage.
    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    /// Returns the metric data for a given name.
    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(30)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, frames_out: u64) {
        self.frames_out = frames_out;
        if frames_out % self.throttle_frames == 0 {
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let fps = if elapsed > 0.0 {
                frames_out as f64 / elapsed
            } else {
                0.0
            };
            log::info!("Relayed {frames_out} frames ({fps:.1} fps)");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        self.messages.push(message.to_string());
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullPipelineLogger;
        logger.progress(1);
        logger.timing("locate", 5.0);
        logger.metric("queue_depth", 3.0);
        logger.info("hello");
        logger.summary();
        // No panics = success
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.timing("locate", 20.0);
        logger.timing("locate", 30.0);
        logger.timing("swap", 5.0);

        let locate = logger.timings_for("locate").unwrap();
        assert_eq!(locate.len(), 2);
        assert!((locate[0] - 20.0).abs() < f64::EPSILON);
        assert!((locate[1] - 30.0).abs() < f64::EPSILON);

        let swap = logger.timings_for("swap").unwrap();
        assert_eq!(swap.len(), 1);
        assert!((swap[0] - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metric_records_values() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.metric("queue_depth", 3.0);
        logger.metric("queue_depth", 4.0);

        let values = logger.metrics_for("queue_depth").unwrap();
        assert_eq!(values.len(), 2);
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        assert!((avg - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_includes_timing() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.progress(10);
        logger.timing("locate", 20.0);
        logger.timing("swap", 5.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("locate"));
        assert!(summary.contains("swap"));
        assert!(summary.contains("Stream summary"));
    }

    #[test]
    fn test_summary_includes_metrics() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.progress(5);
        logger.metric("queue_depth", 3.0);
        logger.metric("queue_depth", 4.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("queue_depth"));
        assert!(summary.contains("avg 3.5"));
    }

    #[test]
    fn test_summary_includes_fps() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.progress(100);
        logger.timing("locate", 10.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("fps"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        let logger = StdoutPipelineLogger::new(10);
        assert!(logger.summary_string().is_none());
    }

    #[test]
    fn test_progress_tracks_frame_count() {
        let mut logger = StdoutPipelineLogger::new(10);
        for i in 1..=20 {
            logger.progress(i);
        }
        assert_eq!(logger.frames_out, 20);
    }

    #[test]
    fn test_info_stores_messages() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.info("hello world");
        assert_eq!(logger.messages.len(), 1);
        assert_eq!(logger.messages[0], "hello world");
    }

    #[test]
    fn test_default_throttle() {
        let logger = StdoutPipelineLogger::default();
        assert_eq!(logger.throttle_frames, 30);
    }
}

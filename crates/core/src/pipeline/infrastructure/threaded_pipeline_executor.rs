use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::compositing::domain::frame_compositor::{
    CompositeResult, FrameCompositor, RegionOutcome,
};
use crate::inference::domain::face_enhancer::FaceEnhancer;
use crate::inference::domain::face_locator::FaceLocator;
use crate::inference::domain::identity_swapper::IdentitySwapper;
use crate::inference::domain::target_identity::TargetIdentity;
use crate::pipeline::degradation::DegradationController;
use crate::pipeline::frame_queue::{FrameQueue, OverflowPolicy};
use crate::pipeline::pipeline_executor::{
    PipelineConfig, PipelineExecutor, PipelineState, SwapEngines,
};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::pipeline_stats::PipelineStats;
use crate::pipeline::reorder_buffer::ReorderBuffer;
use crate::shared::error::{PipelineError, StreamError};
use crate::shared::frame::Frame;
use crate::shared::stream_info::StreamInfo;
use crate::stream::domain::frame_sink::FrameSink;
use crate::stream::domain::frame_source::FrameSource;

const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// One frame's finished processing, keyed by its dispatch ticket.
struct WorkerOutput {
    /// `None` when compositing failed; the collector substitutes the
    /// last successfully emitted frame.
    result: Option<CompositeResult>,
    elapsed_ms: f64,
}

/// Executes the swap pipeline with dedicated threads for I/O and a
/// worker pool for inference.
///
/// Layout: `decode → [drop-oldest queue] → dispatch → workers → collect
/// [reorder/deadline] → encode`
///
/// The dispatcher assigns dense tickets after the queue so the reorder
/// buffer never waits on a frame that was shed.
pub struct ThreadedPipelineExecutor {
    channel_capacity: usize,
}

impl ThreadedPipelineExecutor {
    pub fn new() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Default for ThreadedPipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineExecutor for ThreadedPipelineExecutor {
    fn execute(
        &self,
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        engines: SwapEngines,
        compositor: Arc<dyn FrameCompositor>,
        _info: &StreamInfo,
        stats: Arc<PipelineStats>,
        logger: &mut dyn PipelineLogger,
        config: PipelineConfig,
    ) -> Result<(), PipelineError> {
        let cap = self.channel_capacity;
        let queue = Arc::new(FrameQueue::with_policy(
            config.queue_capacity,
            config.overflow_policy,
        ));
        let degradation = Arc::new(DegradationController::new(
            config.misses_to_degrade,
            config.frames_to_recover,
        ));
        let draining = Arc::new(AtomicBool::new(false));

        let (work_tx, work_rx) = crossbeam_channel::bounded::<(u64, Frame)>(cap);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<(u64, WorkerOutput)>(cap);
        let (write_tx, write_rx) = crossbeam_channel::bounded::<Frame>(cap);

        let decode_handle = spawn_decoder(
            source,
            queue.clone(),
            stats.clone(),
            degradation.clone(),
            draining.clone(),
            config.cancelled.clone(),
        );
        let dispatch_handle = spawn_dispatcher(queue, work_tx);
        let worker_handles: Vec<_> = (0..config.workers.max(1))
            .map(|_| {
                spawn_worker(
                    work_rx.clone(),
                    done_tx.clone(),
                    &engines,
                    compositor.clone(),
                    stats.clone(),
                    degradation.clone(),
                    config.max_faces,
                )
            })
            .collect();
        drop(work_rx);
        drop(done_tx);
        let writer_handle = spawn_writer(sink, write_rx, stats.clone());

        logger.info(&format!("pipeline {}", PipelineState::Running));
        let main_error = run_collect_loop(
            done_rx,
            &write_tx,
            &stats,
            &degradation,
            &draining,
            logger,
            &config,
        );
        drop(write_tx);

        let result = join_threads(
            decode_handle,
            dispatch_handle,
            worker_handles,
            writer_handle,
            main_error,
        );
        logger.info(&format!(
            "pipeline {} ({})",
            PipelineState::Stopped,
            stats.snapshot().describe()
        ));
        logger.summary();
        result
    }
}

fn spawn_decoder(
    mut source: Box<dyn FrameSource>,
    queue: Arc<FrameQueue>,
    stats: Arc<PipelineStats>,
    degradation: Arc<DegradationController>,
    draining: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
) -> std::thread::JoinHandle<Option<StreamError>> {
    std::thread::spawn(move || {
        let mut input_error = None;
        let mut decimate_drop = false;
        {
            for frame_result in source.frames() {
                if cancelled.load(Ordering::Relaxed) {
                    break;
                }
                match frame_result {
                    Ok(frame) => {
                        stats.record_frame_in();
                        if degradation.decimate_input() {
                            // Shed alternate frames before they cost
                            // anything downstream
                            decimate_drop = !decimate_drop;
                            if decimate_drop {
                                stats.record_dropped(1);
                                continue;
                            }
                        }
                        stats.record_dropped(queue.push(frame));
                    }
                    Err(StreamError::Closed) => break,
                    Err(e) => {
                        input_error = Some(e);
                        break;
                    }
                }
            }
        }
        draining.store(true, Ordering::Relaxed);
        queue.close();
        source.close();
        input_error
    })
}

fn spawn_dispatcher(
    queue: Arc<FrameQueue>,
    work_tx: crossbeam_channel::Sender<(u64, Frame)>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut ticket = 0u64;
        while let Some(frame) = queue.pop() {
            if work_tx.send((ticket, frame)).is_err() {
                break;
            }
            ticket += 1;
        }
        // Unblocks a producer stalled on a full queue when the
        // downstream side has already gone away
        queue.close();
    })
}

fn spawn_worker(
    work_rx: crossbeam_channel::Receiver<(u64, Frame)>,
    done_tx: crossbeam_channel::Sender<(u64, WorkerOutput)>,
    engines: &SwapEngines,
    compositor: Arc<dyn FrameCompositor>,
    stats: Arc<PipelineStats>,
    degradation: Arc<DegradationController>,
    max_faces: usize,
) -> std::thread::JoinHandle<()> {
    let locator = engines.locator.clone();
    let swapper = engines.swapper.clone();
    let enhancer = engines.enhancer.clone();
    let identity = engines.identity.clone();

    std::thread::spawn(move || {
        for (ticket, mut frame) in work_rx {
            let start = Instant::now();
            let mut outcomes = Vec::new();

            let regions = match locator.lock().unwrap().locate(&frame) {
                Ok(mut regions) => {
                    if max_faces > 0 {
                        regions.truncate(max_faces);
                    }
                    regions
                }
                Err(e) => {
                    log::warn!("frame {}: {e}, passing through", frame.seq());
                    stats.record_region_skipped();
                    outcomes.push(RegionOutcome::Skipped { stage: e.stage });
                    Vec::new()
                }
            };

            let mut faces = Vec::new();
            for region in &regions {
                match swapper.lock().unwrap().swap(&frame, region, &identity) {
                    Ok(mut swapped) => {
                        let mut enhanced = false;
                        if let Some(enhancer) = &enhancer {
                            if !degradation.skip_enhancer() {
                                match enhancer.lock().unwrap().enhance(&swapped.image) {
                                    Ok(image) => {
                                        swapped.image = image;
                                        enhanced = true;
                                    }
                                    Err(e) => {
                                        // Keep the unenhanced swap
                                        log::warn!("frame {}: {e}", frame.seq());
                                    }
                                }
                            }
                        }
                        stats.record_region_swapped();
                        outcomes.push(RegionOutcome::Swapped { enhanced });
                        faces.push(swapped);
                    }
                    Err(e) => {
                        log::warn!("frame {}: {e}, leaving region untouched", frame.seq());
                        stats.record_region_skipped();
                        outcomes.push(RegionOutcome::Skipped { stage: e.stage });
                    }
                }
            }

            let result = match compositor.composite(&mut frame, &faces) {
                Ok(()) => Some(CompositeResult { frame, outcomes }),
                Err(e) => {
                    log::error!("{e}, repeating last frame");
                    None
                }
            };

            let output = WorkerOutput {
                result,
                elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
            };
            if done_tx.send((ticket, output)).is_err() {
                break;
            }
        }
    })
}

fn spawn_writer(
    mut sink: Box<dyn FrameSink>,
    write_rx: crossbeam_channel::Receiver<Frame>,
    stats: Arc<PipelineStats>,
) -> std::thread::JoinHandle<Option<StreamError>> {
    std::thread::spawn(move || {
        let mut write_error: Option<StreamError> = None;
        // Keep draining even after an error so the collector never
        // blocks on a full channel
        for frame in write_rx {
            if write_error.is_some() {
                continue;
            }
            match sink.write(&frame) {
                Ok(()) => stats.record_frame_out(),
                Err(e) => write_error = Some(e),
            }
        }
        if let Err(e) = sink.finalize() {
            if write_error.is_none() {
                write_error = Some(e);
            }
        }
        write_error
    })
}

/// Receives finished frames, restores ticket order, tracks deadlines,
/// and feeds the writer. Substitutes the last emitted frame when a
/// result is lost or compositing failed.
fn run_collect_loop(
    done_rx: crossbeam_channel::Receiver<(u64, WorkerOutput)>,
    write_tx: &crossbeam_channel::Sender<Frame>,
    stats: &PipelineStats,
    degradation: &DegradationController,
    draining: &Arc<AtomicBool>,
    logger: &mut dyn PipelineLogger,
    config: &PipelineConfig,
) -> Option<PipelineError> {
    let mut reorder: ReorderBuffer<WorkerOutput> = ReorderBuffer::new();
    let mut last_good: Option<Frame> = None;
    let mut frames_out = 0u64;
    let mut draining_logged = false;

    loop {
        if draining.load(Ordering::Relaxed) && !draining_logged {
            logger.info(&format!("pipeline {}", PipelineState::Draining));
            draining_logged = true;
        }

        let timeout = if draining_logged {
            Duration::from_secs(config.drain_timeout_secs)
        } else {
            Duration::from_millis(100)
        };
        let (ticket, output) = match done_rx.recv_timeout(timeout) {
            Ok(item) => item,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if draining_logged {
                    return Some(PipelineError::DrainTimeout(config.drain_timeout_secs));
                }
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        let missed = output.elapsed_ms > config.frame_budget_ms;
        if missed {
            stats.record_deadline_miss();
        }
        if let Some(level) = degradation.record_frame(missed) {
            logger.info(&format!("degradation level is now {level:?}"));
        }
        logger.timing("process", output.elapsed_ms);

        if ticket < reorder.next_ticket() {
            // A stand-in already went out for this position
            log::warn!("discarding late result for abandoned ticket {ticket}");
            stats.record_dropped(1);
            continue;
        }

        for released in reorder.insert(ticket, output) {
            if let Some(err) =
                emit(released, &mut last_good, write_tx, stats, &mut frames_out, logger)
            {
                return Some(err);
            }
        }

        // The buffer is bounded by the worker pool size. A hole that
        // outlasts this many finished results was lost to a panic or
        // a badly lagging worker; abandon it with a stand-in instead
        // of pooling frames until shutdown.
        while reorder.pending_len() > config.workers.max(1) {
            log::warn!(
                "no result for ticket {}, repeating last frame",
                reorder.next_ticket()
            );
            if let Some(frame) = last_good.clone() {
                stats.record_repeated();
                if write_tx.send(frame).is_err() {
                    return Some(PipelineError::WorkerPanicked("writer"));
                }
                frames_out += 1;
                logger.progress(frames_out);
            } else {
                stats.record_dropped(1);
            }
            for released in reorder.skip_next() {
                if let Some(err) =
                    emit(released, &mut last_good, write_tx, stats, &mut frames_out, logger)
                {
                    return Some(err);
                }
            }
        }
    }

    // Workers are gone. Any hole in the ticket sequence means a result
    // was lost to a panic; fill it with a repeat so downstream stays
    // contiguous.
    while !reorder.is_empty() {
        if let Some(frame) = last_good.clone() {
            stats.record_repeated();
            if write_tx.send(frame).is_err() {
                return Some(PipelineError::WorkerPanicked("writer"));
            }
            frames_out += 1;
            logger.progress(frames_out);
        }
        for released in reorder.skip_next() {
            if let Some(err) =
                emit(released, &mut last_good, write_tx, stats, &mut frames_out, logger)
            {
                return Some(err);
            }
        }
    }

    None
}

fn emit(
    output: WorkerOutput,
    last_good: &mut Option<Frame>,
    write_tx: &crossbeam_channel::Sender<Frame>,
    stats: &PipelineStats,
    frames_out: &mut u64,
    logger: &mut dyn PipelineLogger,
) -> Option<PipelineError> {
    let frame = match output.result {
        Some(CompositeResult { frame, outcomes }) => {
            let swapped = outcomes
                .iter()
                .filter(|o| matches!(o, RegionOutcome::Swapped { .. }))
                .count();
            logger.metric("regions_swapped", swapped as f64);
            *last_good = Some(frame.clone());
            frame
        }
        None => match last_good.clone() {
            Some(frame) => {
                stats.record_repeated();
                frame
            }
            None => {
                // Composite failed before anything good was emitted
                stats.record_dropped(1);
                return None;
            }
        },
    };

    if write_tx.send(frame).is_err() {
        return Some(PipelineError::WorkerPanicked("writer"));
    }
    *frames_out += 1;
    logger.progress(*frames_out);
    None
}

/// Joins all pipeline threads and coalesces the first error encountered.
fn join_threads(
    decode_handle: std::thread::JoinHandle<Option<StreamError>>,
    dispatch_handle: std::thread::JoinHandle<()>,
    worker_handles: Vec<std::thread::JoinHandle<()>>,
    writer_handle: std::thread::JoinHandle<Option<StreamError>>,
    mut first_error: Option<PipelineError>,
) -> Result<(), PipelineError> {
    fn set_if_none(slot: &mut Option<PipelineError>, err: PipelineError) {
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    match decode_handle.join() {
        Ok(Some(e)) => set_if_none(&mut first_error, PipelineError::Input(e)),
        Ok(None) => {}
        Err(_) => set_if_none(&mut first_error, PipelineError::WorkerPanicked("decode")),
    }

    if dispatch_handle.join().is_err() {
        set_if_none(&mut first_error, PipelineError::WorkerPanicked("dispatch"));
    }

    for handle in worker_handles {
        if handle.join().is_err() {
            set_if_none(&mut first_error, PipelineError::WorkerPanicked("swap"));
        }
    }

    match writer_handle.join() {
        Ok(Some(e)) => set_if_none(&mut first_error, PipelineError::Output(e)),
        Ok(None) => {}
        Err(_) => set_if_none(&mut first_error, PipelineError::WorkerPanicked("encode")),
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

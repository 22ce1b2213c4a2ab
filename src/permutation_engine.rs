// THEORY:
// The `PermutationEngine` is the parallel heart of the significance test. A
// sweep is embarrassingly parallel: every shift is an independent trial
// against the same read-only channel data, so the engine partitions the shift
// list round-robin across a fixed pool of workers and merges their result
// buffers only after every worker has finished.
//
// Key architectural principles:
// 1.  **Worker-Local Mutation Only**: The channel stacks, the confinement
//     mask, and the shifter's site lists are shared read-only behind an
//     `Arc`. Each worker owns one `ShiftWorkspace` (a shifted-copy buffer
//     plus an accumulator, `clear()`ed per trial), so the hot path takes no
//     lock and shares no mutable state.
// 2.  **Deterministic Partitioning**: Which shift runs on which worker is
//     decided on the calling thread before anything dispatches. With a fixed
//     seed and worker count, a sweep is reproducible even though worker
//     interleaving is not; result order is meaningless by design.
// 3.  **Cooperative Cancellation**: Workers poll an atomic flag between
//     trials. In-flight trials complete, nothing new starts, and whatever was
//     finished remains valid; the outcome reports the achieved count next to
//     the requested one.
// 4.  **End-Merge, Not Interleaved Append**: Per-worker result buffers are
//     concatenated after joining, never pushed into a shared list mid-sweep.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::core_modules::accumulator::StatisticsAccumulator;
use crate::core_modules::channel_stack::{ChannelStack, ConfinementMask, MASK_INACTIVE};
use crate::core_modules::shift::Shift;
use crate::core_modules::shifter::ToroidalShifter;
use crate::core_modules::sweep_result::CalculationResult;
use crate::error::CdaError;

/// Everything a sweep shares read-only across workers: the channel data, the
/// confinement geometry, and the Manders denominators precomputed once.
#[derive(Debug)]
pub struct SweepContext {
    pub channel1: ChannelStack,
    pub channel2: ChannelStack,
    pub confinement: Option<ConfinementMask>,
    shifter: ToroidalShifter,
    /// Sum of channel-1 intensity inside its own mask and the ROI.
    pub channel1_total: u64,
    /// Sum of channel-2 intensity inside its own mask and the ROI.
    pub channel2_total: u64,
    /// Count of ROI-active positions (the comparison universe).
    pub confined_area: u64,
}

impl SweepContext {
    /// Validates geometry, builds the shifter's site lists, and precomputes
    /// the intensity denominators. All precondition failures surface here,
    /// before any trial runs.
    pub fn prepare(
        channel1: ChannelStack,
        channel2: ChannelStack,
        confinement: Option<ConfinementMask>,
    ) -> Result<Self, CdaError> {
        channel1.require_same_shape(&channel2, "channel 2")?;
        if let Some(roi) = &confinement {
            roi.require_matches(&channel1)?;
        }

        let (width, height, depth) = channel1.dimensions();
        let shifter = ToroidalShifter::new(width, height, depth, confinement.as_ref())?;

        let channel1_total = channel1.masked_intensity_sum(confinement.as_ref());
        let channel2_total = channel2.masked_intensity_sum(confinement.as_ref());
        let confined_area = match &confinement {
            Some(roi) => roi.active_area(),
            None => channel1.values.len() as u64,
        };

        Ok(Self {
            channel1,
            channel2,
            confinement,
            shifter,
            channel1_total,
            channel2_total,
            confined_area,
        })
    }

    /// Allocates one worker's scratch state: a channel-2 sized copy buffer
    /// pair and a streaming accumulator.
    pub fn workspace(&self) -> ShiftWorkspace {
        ShiftWorkspace {
            accumulator: StatisticsAccumulator::new(),
            values: vec![0; self.channel2.values.len()],
            mask: vec![0; self.channel2.mask.len()],
        }
    }

    /// Runs one trial: shift channel 2 (value+mask) toroidally, accumulate
    /// over the triple mask intersection, derive M1/M2/R.
    pub fn evaluate(
        &self,
        shift: Shift,
        workspace: &mut ShiftWorkspace,
    ) -> Result<CalculationResult, CdaError> {
        workspace.values.copy_from_slice(&self.channel2.values);
        workspace.mask.copy_from_slice(&self.channel2.mask);
        if shift != Shift::ZERO {
            self.shifter
                .shift(&mut workspace.values, &mut workspace.mask, shift)?;
        }

        let accumulator = &mut workspace.accumulator;
        accumulator.clear();
        for idx in 0..self.channel1.values.len() {
            if self.channel1.mask[idx] == MASK_INACTIVE || workspace.mask[idx] == MASK_INACTIVE {
                continue;
            }
            if let Some(roi) = &self.confinement {
                if !roi.is_active(idx) {
                    continue;
                }
            }
            accumulator.add(self.channel1.values[idx], workspace.values[idx]);
        }

        let overlapping_pixels = accumulator.n();
        let m1 = fraction(accumulator.sum_x(), self.channel1_total);
        let m2 = fraction(accumulator.sum_y(), self.channel2_total);
        let percent_area_overlap = if self.confined_area == 0 {
            f64::NAN
        } else {
            100.0 * overlapping_pixels as f64 / self.confined_area as f64
        };

        Ok(CalculationResult {
            distance: shift.distance(),
            m1,
            m2,
            r: accumulator.correlation(),
            overlapping_pixels,
            percent_area_overlap,
        })
    }
}

/// NaN for a zero denominator: an all-dark channel has no defined Manders
/// fraction, and NaN must never be coerced to 0.
fn fraction(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        f64::NAN
    } else {
        numerator as f64 / denominator as f64
    }
}

/// One worker's private mutable state, reused across its trials.
pub struct ShiftWorkspace {
    accumulator: StatisticsAccumulator,
    values: Vec<u16>,
    mask: Vec<u8>,
}

/// Progress notification sent after each completed trial.
#[derive(Debug, Clone, Copy)]
pub struct SweepProgress {
    pub completed: usize,
    pub total: usize,
}

/// The merged output of a sweep, valid even after cancellation.
#[derive(Debug)]
pub struct SweepOutcome {
    /// Per-trial results in arbitrary order.
    pub results: Vec<CalculationResult>,
    /// Trials requested (shift list length).
    pub requested: usize,
    /// Trials actually evaluated.
    pub achieved: usize,
    /// Whether the cancel flag stopped the sweep early.
    pub cancelled: bool,
}

/// Fixed-size worker pool evaluating a shift list against one `SweepContext`.
pub struct PermutationEngine {
    worker_count: usize,
}

impl PermutationEngine {
    /// A pool of `worker_count` workers (minimum 1).
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
        }
    }

    /// A pool sized to the machine's available processors.
    pub fn with_default_workers() -> Self {
        Self::new(num_cpus::get())
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Evaluates every shift, round-robin across the pool. Returns the merged
    /// per-worker buffers; on cancellation the partial outcome is still valid.
    pub async fn run_sweep(
        &self,
        context: Arc<SweepContext>,
        shifts: Vec<Shift>,
        cancel: Arc<AtomicBool>,
        progress: Option<mpsc::UnboundedSender<SweepProgress>>,
    ) -> Result<SweepOutcome, CdaError> {
        let requested = shifts.len();
        info!(
            "permutation sweep: {} trials across {} workers",
            requested, self.worker_count
        );

        // Partition on this thread so the trial-to-worker assignment is a
        // pure function of the shift list and the worker count.
        let mut buckets: Vec<Vec<Shift>> = vec![Vec::new(); self.worker_count];
        for (i, shift) in shifts.into_iter().enumerate() {
            buckets[i % self.worker_count].push(shift);
        }

        let completed = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(self.worker_count);
        for (worker_id, bucket) in buckets.into_iter().enumerate() {
            let context = Arc::clone(&context);
            let cancel = Arc::clone(&cancel);
            let completed = Arc::clone(&completed);
            let progress = progress.clone();

            handles.push(tokio::spawn(async move {
                let mut workspace = context.workspace();
                let mut results = Vec::with_capacity(bucket.len());
                for shift in bucket {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    results.push(context.evaluate(shift, &mut workspace)?);
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(tx) = &progress {
                        let _ = tx.send(SweepProgress {
                            completed: done,
                            total: requested,
                        });
                    }
                }
                debug!("worker {} finished with {} results", worker_id, results.len());
                Ok::<Vec<CalculationResult>, CdaError>(results)
            }));
        }

        let mut results = Vec::with_capacity(requested);
        for joined in join_all(handles).await {
            let worker_results =
                joined.map_err(|e| CdaError::Worker(e.to_string()))??;
            results.extend(worker_results);
        }

        let achieved = results.len();
        let cancelled = cancel.load(Ordering::Relaxed);
        if cancelled {
            warn!(
                "sweep cancelled: {} of {} trials evaluated",
                achieved, requested
            );
        }

        Ok(SweepOutcome {
            results,
            requested,
            achieved,
            cancelled,
        })
    }
}

// THEORY:
// The `pipeline` module is the top-level API of the engine. It wires the full
// stack together for one analysis run: validate the configuration and the
// channel geometry, precompute the Manders denominators, sample the shift
// list, run the parallel permutation sweep, build the empirical nulls, and
// classify the unshifted baseline.
//
// The pipeline owns no UI and remembers nothing between runs: configuration
// arrives as one explicit immutable value, progress leaves through an
// optional channel, and results come back as a single `AnalysisReport` plus
// a delimited results-row string for whatever tabular sink the host uses.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use log::{info, warn};
use tokio::sync::mpsc;

use crate::core_modules::channel_stack::{ChannelStack, ConfinementMask};
use crate::core_modules::null_distribution::NullDistribution;
use crate::core_modules::shift::MAX_PACKABLE_RADIUS;
use crate::core_modules::shift_sampler::ShiftSampler;
use crate::error::CdaError;
use crate::permutation_engine::{PermutationEngine, SweepContext};

// Re-export key data structures for the public API.
pub use crate::core_modules::null_distribution::{
    Histogram, PercentileLimits, SignificanceVerdict,
};
pub use crate::core_modules::shift_sampler::SeedPolicy;
pub use crate::core_modules::sweep_result::{CalculationResult, Statistic};
pub use crate::permutation_engine::SweepProgress;

/// Configuration for one analysis run, supplied whole and never mutated.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Largest displacement magnitude to sample.
    pub maximum_radius: u32,
    /// Displacements beyond this magnitude feed the null distribution.
    pub random_radius: u32,
    /// Randomized trial budget (the baseline is extra).
    pub permutation_budget: usize,
    /// Bin count for the display histograms.
    pub histogram_bins: usize,
    /// Two-tailed significance level.
    pub p_value: f64,
    /// Also sample displacements inside the random radius for the
    /// correlation-versus-distance curve.
    pub sub_random_samples: bool,
    /// Whether shift selection is reproducible or fresh each run.
    pub seed: SeedPolicy,
    /// Worker pool size; 0 means one per available processor.
    pub worker_count: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            maximum_radius: 20,
            random_radius: 10,
            permutation_budget: 500,
            histogram_bins: 16,
            p_value: 0.05,
            sub_random_samples: false,
            seed: SeedPolicy::Entropy,
            worker_count: 0,
        }
    }
}

impl AnalysisConfig {
    /// Validates every field before a sweep is allowed to start.
    pub fn validate(&self) -> Result<(), CdaError> {
        if self.random_radius > self.maximum_radius {
            return Err(CdaError::InvalidShiftRange {
                random_radius: self.random_radius,
                maximum_radius: self.maximum_radius,
            });
        }
        if self.maximum_radius == 0 {
            return Err(CdaError::EmptyAnnulus {
                min_radius: self.random_radius,
                max_radius: self.maximum_radius,
            });
        }
        if self.maximum_radius > MAX_PACKABLE_RADIUS as u32 {
            return Err(CdaError::InvalidConfig {
                field: "maximum_radius",
                reason: format!(
                    "{} exceeds the packable limit {MAX_PACKABLE_RADIUS}",
                    self.maximum_radius
                ),
            });
        }
        if !(self.p_value > 0.0 && self.p_value < 0.5) {
            return Err(CdaError::InvalidConfig {
                field: "p_value",
                reason: format!("{} is outside (0, 0.5)", self.p_value),
            });
        }
        if self.permutation_budget == 0 {
            return Err(CdaError::InvalidConfig {
                field: "permutation_budget",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.histogram_bins == 0 {
            return Err(CdaError::InvalidConfig {
                field: "histogram_bins",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Identifying labels for the results row; meaning is owned by the host.
#[derive(Debug, Clone)]
pub struct AnalysisMetadata {
    pub image_id: String,
    pub method: String,
    pub frame: u32,
    pub channel1_label: String,
    pub channel2_label: String,
    pub confinement_label: String,
}

/// One statistic's observed value, null limits, verdict, and display
/// histogram. `verdict = None` means the significance is undefined.
#[derive(Debug, Clone)]
pub struct StatisticSummary {
    pub statistic: Statistic,
    pub observed: f64,
    pub limits: Option<PercentileLimits>,
    pub verdict: Option<SignificanceVerdict>,
    pub histogram: Option<Histogram>,
    /// Null-pool size after the distance cut and NaN exclusion.
    pub null_samples: usize,
}

/// The complete product of one analysis run.
#[derive(Debug)]
pub struct AnalysisReport {
    /// The unshifted (distance 0) trial under test.
    pub baseline: CalculationResult,
    pub m1: StatisticSummary,
    pub m2: StatisticSummary,
    pub r: StatisticSummary,
    /// Trials requested / evaluated, and whether cancellation cut the sweep.
    pub requested_samples: usize,
    pub achieved_samples: usize,
    pub cancelled: bool,
    /// Every trial, ascending by displacement distance, for curve display.
    pub results: Vec<CalculationResult>,
}

/// The main, top-level struct for the colocalisation engine.
pub struct CdaPipeline {
    config: AnalysisConfig,
    engine: PermutationEngine,
    sampler: ShiftSampler,
}

impl CdaPipeline {
    pub fn new(config: AnalysisConfig) -> Result<Self, CdaError> {
        config.validate()?;
        let engine = if config.worker_count == 0 {
            PermutationEngine::with_default_workers()
        } else {
            PermutationEngine::new(config.worker_count)
        };
        let sampler = ShiftSampler::new(
            config.random_radius,
            config.maximum_radius,
            config.sub_random_samples,
        )?;
        Ok(Self {
            config,
            engine,
            sampler,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Runs the full analysis. `cancel` may be flipped from any thread to
    /// stop the sweep after its in-flight trials; `progress` receives one
    /// update per completed trial.
    pub async fn run(
        &self,
        channel1: ChannelStack,
        channel2: ChannelStack,
        confinement: Option<ConfinementMask>,
        cancel: Option<Arc<AtomicBool>>,
        progress: Option<mpsc::UnboundedSender<SweepProgress>>,
    ) -> Result<AnalysisReport, CdaError> {
        let context = Arc::new(SweepContext::prepare(channel1, channel2, confinement)?);
        let shifts = self
            .sampler
            .sample(self.config.permutation_budget, &self.config.seed)?;
        info!(
            "analysis run: {} shifts, random radius {}, p = {}",
            shifts.len(),
            self.config.random_radius,
            self.config.p_value
        );

        let cancel = cancel.unwrap_or_else(|| Arc::new(AtomicBool::new(false)));
        let outcome = self
            .engine
            .run_sweep(Arc::clone(&context), shifts, cancel, progress)
            .await?;

        let mut results = outcome.results;
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        let baseline = results
            .iter()
            .find(|r| r.is_baseline())
            .cloned()
            .ok_or(CdaError::CancelledBeforeBaseline)?;
        if baseline.r.is_nan() {
            warn!("observed correlation is undefined (no overlapping pixels)");
        }

        let summarize = |which: Statistic, observed: f64| {
            let pool = NullDistribution::from_results(&results, which, self.config.random_radius);
            StatisticSummary {
                statistic: which,
                observed,
                limits: pool.limits(self.config.p_value),
                verdict: pool.classify(observed, self.config.p_value),
                histogram: pool.histogram(self.config.histogram_bins),
                null_samples: pool.len(),
            }
        };

        Ok(AnalysisReport {
            m1: summarize(Statistic::M1, baseline.m1),
            m2: summarize(Statistic::M2, baseline.m2),
            r: summarize(Statistic::R, baseline.r),
            requested_samples: outcome.requested,
            achieved_samples: outcome.achieved,
            cancelled: outcome.cancelled,
            baseline,
            results,
        })
    }

    /// Formats the delimited results row consumed by the external tabular
    /// sink: identification, sample count, overlap, then each statistic with
    /// its significance flag (`1` colocated, `0` otherwise, `nan` undefined).
    pub fn results_row(&self, metadata: &AnalysisMetadata, report: &AnalysisReport) -> String {
        let flag = |summary: &StatisticSummary| match summary.verdict {
            Some(SignificanceVerdict::SignificantColocated) => "1",
            Some(_) => "0",
            None => "nan",
        };
        [
            metadata.image_id.clone(),
            format!("{}", self.config.p_value),
            metadata.method.clone(),
            format!("{}", metadata.frame),
            metadata.channel1_label.clone(),
            metadata.channel2_label.clone(),
            metadata.confinement_label.clone(),
            format!("{}", report.achieved_samples),
            format!("{:.4}", report.baseline.percent_area_overlap),
            format!("{:.6}", report.m1.observed),
            flag(&report.m1).to_string(),
            format!("{:.6}", report.m2.observed),
            flag(&report.m2).to_string(),
            format!("{:.6}", report.r.observed),
            flag(&report.r).to_string(),
        ]
        .join("\t")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        AnalysisConfig::default().validate().unwrap();
    }

    #[test]
    fn inverted_radii_fail_validation() {
        let config = AnalysisConfig {
            maximum_radius: 5,
            random_radius: 9,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CdaError::InvalidShiftRange { .. })
        ));
    }

    #[test]
    fn unpackable_maximum_radius_fails_validation() {
        let config = AnalysisConfig {
            maximum_radius: MAX_PACKABLE_RADIUS as u32 + 1,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CdaError::InvalidConfig {
                field: "maximum_radius",
                ..
            })
        ));
    }

    #[test]
    fn out_of_range_p_value_fails_validation() {
        for p in [0.0, 0.5, 1.2, -0.1] {
            let config = AnalysisConfig {
                p_value: p,
                ..AnalysisConfig::default()
            };
            assert!(config.validate().is_err(), "p = {p} should be rejected");
        }
    }

    #[test]
    fn zero_budget_and_zero_bins_fail_validation() {
        let config = AnalysisConfig {
            permutation_budget: 0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AnalysisConfig {
            histogram_bins: 0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

// THEORY:
// This file is the main entry point for the `coloc_cda` library crate. It
// exposes the high-level `CdaPipeline` (plus its configuration and report
// types) as the clean interface to the whole significance engine, while the
// internal layers (`core_modules`) stay encapsulated behind it.
//
// The engine answers one question: are two microscopy channels spatially
// colocalised beyond what chance alone would produce? It answers it with a
// confined-displacement permutation test: channel 2 is toroidally permuted
// inside the region of interest many times, each displaced configuration is
// scored (Manders' M1/M2, Pearson's R), and the unshifted configuration is
// placed against the empirical null those scores form.

pub mod core_modules;
pub mod error;
pub mod permutation_engine;
pub mod pipeline;

pub use error::CdaError;
pub use pipeline::{
    AnalysisConfig, AnalysisMetadata, AnalysisReport, CdaPipeline, StatisticSummary,
};

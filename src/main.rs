// This file is an example of how to drive the `coloc_cda` library.
// The main library entry point is `src/lib.rs`.

use coloc_cda::pipeline::SeedPolicy;
use coloc_cda::{AnalysisConfig, CdaPipeline};
use coloc_cda::core_modules::channel_stack::ChannelStack;

#[tokio::main]
async fn main() {
    println!("CDA Colocalisation Engine - Example Runner");

    // A real host would load two thresholded channels and an ROI mask from
    // its imaging layer. Here: two identical synthetic blobs, which should
    // classify as significantly colocated against their own null.
    let width = 64u32;
    let height = 64u32;
    let values: Vec<u16> = (0..width * height)
        .map(|i| {
            let x = (i % width) as i32 - 32;
            let y = (i / width) as i32 - 32;
            if x * x + y * y <= 144 { 4000 } else { 10 }
        })
        .collect();
    let channel1 = ChannelStack::fully_active(width, height, 1, values.clone()).unwrap();
    let channel2 = ChannelStack::fully_active(width, height, 1, values).unwrap();

    let config = AnalysisConfig {
        seed: SeedPolicy::Fixed(0xC0FFEE),
        ..AnalysisConfig::default()
    };
    let pipeline = CdaPipeline::new(config).expect("valid configuration");
    let report = pipeline
        .run(channel1, channel2, None, None, None)
        .await
        .expect("analysis run");

    println!(
        "baseline: R = {:.4}, M1 = {:.4}, M2 = {:.4} over {} pixels",
        report.baseline.r, report.baseline.m1, report.baseline.m2, report.baseline.overlapping_pixels
    );
    println!(
        "verdicts: M1 {:?}, M2 {:?}, R {:?} ({} null samples)",
        report.m1.verdict, report.m2.verdict, report.r.verdict, report.r.null_samples
    );
}

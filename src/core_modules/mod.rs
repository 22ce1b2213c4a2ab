pub mod accumulator;
pub mod channel_stack;
pub mod null_distribution;
pub mod shift;
pub mod shift_sampler;
pub mod shifter;
pub mod sweep_result;
pub mod utils;

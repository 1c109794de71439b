/// Background worker that runs diagnostic bursts
pub mod sampling_loop;

pub use sampling_loop::{
    BurstSettings, LoopState, LoopStateCell, SamplingLoop, DIAGNOSTIC_COMMANDS, IOSTAT_COMMAND,
    IOTOP_COMMAND,
};

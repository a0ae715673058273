//! Worker loops for the vidslim pipeline.
//!
//! Five cooperating actors advance jobs through the status state
//! machine: the scanner discovers files, the approver promotes them,
//! the synthesizer asks the model for a transcoder invocation, the
//! transcoder runs it under supervision, and the mover swaps the result
//! into place. They share nothing but the store.

pub mod approver;
pub mod config;
pub mod error;
pub mod hostinfo;
pub mod llm;
pub mod mover;
pub mod probe;
pub mod progress;
pub mod scanner;
pub mod synthesizer;
pub mod tick;
pub mod transcoder;

pub use approver::Approver;
pub use config::Config;
pub use error::{Result, WorkerError};
pub use hostinfo::{HostInfo, HostOverrides};
pub use llm::{CommandModel, OpenAiModel};
pub use mover::Mover;
pub use probe::{Ffprobe, MediaProbe, ProbeReport};
pub use scanner::Scanner;
pub use synthesizer::Synthesizer;
pub use tick::{run_loop, LoopPolicy, Tick, WorkerLoop};
pub use transcoder::Transcoder;

//! Library surface for dashmon_agent: the sampler engine plus its host probes.

pub mod config;
pub mod error;
pub mod gpu;
pub mod history;
pub mod probe;
pub mod recorder;
pub mod sampler;
pub mod sensors;
pub mod source;
pub mod types;

pub use config::SamplerConfig;
pub use error::SampleError;
pub use history::{History, HistoryBuffer, Metric};
pub use sampler::Sampler;
pub use types::Snapshot;

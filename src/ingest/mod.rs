//! Frame ingestion sources.
//!
//! Capture and decoding belong to external collaborators. The sources here
//! produce `Frame`s for the pipeline:
//! - `stub://` URLs: deterministic synthetic frames on a virtual timeline,
//!   optionally limited to a fixed number of frames (a recorded "file").
//!
//! Sources never write frames anywhere; a frame lives for one cycle.

mod synthetic;

pub use synthetic::{SourceStats, SyntheticConfig, SyntheticSource};

// Core modules
pub mod cli;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod media;
pub mod paths;

// Pipeline stages
pub mod albums;
pub mod dates;
pub mod dedup;
pub mod discovery;
pub mod exif_write;
pub mod exiftool;
pub mod fileops;
pub mod pipeline;
pub mod sidecar;
pub mod strategies;
pub mod target_paths;

// Re-exports for convenience
pub use cli::Cli;
pub use concurrency::ConcurrencyManager;
pub use config::{AlbumBehavior, DateDivision, ExtensionFixMode, ProcessingConfig};
pub use error::{Result, TakeoutError};
pub use media::{ExtractionMethod, FileReference, MediaCollection, MediaEntity};
pub use pipeline::{Pipeline, PipelineResult, StepResult};

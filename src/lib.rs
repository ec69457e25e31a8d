#![warn(missing_docs)]
//! Veogen - Veo video generation from the command line or from code.
//!
//! Submits text-to-video and image-to-video jobs to Google's Veo model
//! through Vertex AI (or the Gemini Developer API), polls the long-running
//! operation, and saves the resulting MP4 locally.
//!
//! # Quick Start
//!
//! ```no_run
//! use veogen::{GenerationOptions, VeoClient, VeoConfig, VideoGenerator};
//!
//! #[tokio::main]
//! async fn main() -> veogen::Result<()> {
//!     let config = VeoConfig::from_env()?;
//!     let bucket = config.storage_bucket().map(str::to_string);
//!     let generator = VideoGenerator::new(VeoClient::builder(config).build()?)
//!         .with_storage_bucket(bucket);
//!
//!     let options = GenerationOptions::new("A cat playing with a ball")
//!         .with_duration(6)
//!         .with_aspect_ratio("9:16");
//!     let video = generator.generate(&options).await?;
//!     println!("saved {}", video.path.display());
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `service-account`: authenticate with a service-account key file (default)
//! - `cli`: the `veogen` command-line interface (default)

pub mod auth;
pub mod config;
mod error;
pub mod video;

// Re-export error types at crate root
pub use error::{Result, ValidationError, VeoGenError};

pub use auth::{CredentialSource, Credentials};
pub use config::{Backend, VeoConfig, VeoConfigBuilder};

pub use video::providers::{VeoClient, VeoClientBuilder};
pub use video::{
    ArtifactWriter, AspectRatio, Clock, GenerationMode, GenerationOptions, GenerationRequest,
    ManualClock, Operation, OperationClient, OperationHandle, OperationPoller, OperationState,
    OperationStatus, PollPolicy, RetryPolicy, SystemClock, VideoArtifact, VideoGenerator,
    VideoMetadata, VideoPayload,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::VeoConfig;
    pub use crate::error::{Result, VeoGenError};
    pub use crate::video::providers::VeoClient;
    pub use crate::video::{GenerationOptions, OperationClient, VideoArtifact, VideoGenerator};
}

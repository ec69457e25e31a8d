//! Video generation module.

pub mod artifact;
mod client;
pub mod clock;
mod generator;
mod operation;
pub mod poller;
pub mod providers;
pub mod request;
mod retry;
mod types;

pub use artifact::{filename_stem, ArtifactWriter};
pub use client::OperationClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use generator::VideoGenerator;
pub use operation::{Operation, OperationHandle, OperationState, OperationStatus};
pub use poller::{OperationPoller, PollPolicy};
pub use request::GenerationOptions;
pub use retry::RetryPolicy;
pub use types::{
    AspectRatio, GenerationMode, GenerationRequest, ImageFormat, ReferenceImage, VideoArtifact,
    VideoMetadata, VideoPayload,
};

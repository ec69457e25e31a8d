//! One generation end to end: validate, submit, poll, save.

use crate::error::{Result, VeoGenError};
use crate::video::artifact::{filename_stem, ArtifactWriter};
use crate::video::client::OperationClient;
use crate::video::clock::{Clock, SystemClock};
use crate::video::operation::OperationHandle;
use crate::video::poller::{OperationPoller, PollPolicy};
use crate::video::request::GenerationOptions;
use crate::video::types::{GenerationRequest, VideoArtifact, VideoMetadata, VideoPayload};
use std::sync::Arc;
use tokio::sync::watch;

/// Generates videos through an [`OperationClient`] and saves them locally.
///
/// ```no_run
/// use veogen::{GenerationOptions, VeoClient, VeoConfig, VideoGenerator};
///
/// #[tokio::main]
/// async fn main() -> veogen::Result<()> {
///     let config = VeoConfig::from_env()?;
///     let client = VeoClient::builder(config).build()?;
///     let generator = VideoGenerator::new(client);
///     let artifact = generator
///         .generate(&GenerationOptions::new("A cat surfing at sunset"))
///         .await?;
///     println!("{}", artifact.path.display());
///     Ok(())
/// }
/// ```
pub struct VideoGenerator {
    client: Arc<dyn OperationClient>,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
    writer: ArtifactWriter,
    storage_bucket: Option<String>,
    in_flight: watch::Sender<Option<OperationHandle>>,
}

impl VideoGenerator {
    /// Creates a generator with default polling, the system clock and the
    /// current directory as output.
    pub fn new(client: impl OperationClient + 'static) -> Self {
        Self::from_arc(Arc::new(client))
    }

    /// Like [`VideoGenerator::new`] for an already shared client.
    pub fn from_arc(client: Arc<dyn OperationClient>) -> Self {
        Self {
            client,
            clock: Arc::new(SystemClock),
            policy: PollPolicy::default(),
            writer: ArtifactWriter::default(),
            storage_bucket: None,
            in_flight: watch::channel(None).0,
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the polling policy.
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Writes artifacts into `writer`'s directory.
    pub fn with_writer(mut self, writer: ArtifactWriter) -> Self {
        self.writer = writer;
        self
    }

    /// Asks the service to store outputs under `gs://<bucket>/videos/`.
    pub fn with_storage_bucket(mut self, bucket: Option<String>) -> Self {
        self.storage_bucket = bucket;
        self
    }

    /// The underlying client.
    pub fn client(&self) -> &Arc<dyn OperationClient> {
        &self.client
    }

    /// Watches the operation currently being polled, if any.
    pub fn in_flight(&self) -> watch::Receiver<Option<OperationHandle>> {
        self.in_flight.subscribe()
    }

    /// Runs one generation and returns the saved artifact.
    ///
    /// Nothing is sent to the service if `options` fail validation, and no
    /// file is written unless the operation succeeds.
    pub async fn generate(&self, options: &GenerationOptions) -> Result<VideoArtifact> {
        let request = options.validate()?;
        self.generate_request(request).await
    }

    /// Runs one generation from an already validated request.
    pub async fn generate_request(&self, mut request: GenerationRequest) -> Result<VideoArtifact> {
        if let Some(bucket) = &self.storage_bucket {
            request = request.with_storage_bucket(bucket);
        }
        let started = self.clock.now();

        let poller = OperationPoller::new(self.client.as_ref(), self.clock.as_ref(), &self.policy)
            .with_in_flight(&self.in_flight);
        let mut operation = poller.run(&request).await?;
        let handle = operation.handle().to_string();

        let payload = operation.take_payload().ok_or_else(|| {
            VeoGenError::UnexpectedResponse(format!("operation {handle} succeeded without a video"))
        })?;
        let (data, source_uri) = match payload {
            VideoPayload::Inline(data) => (data, None),
            VideoPayload::Remote(uri) => {
                let data = self
                    .policy
                    .retry
                    .run(self.clock.as_ref(), "download", || self.client.download(&uri))
                    .await?;
                (data, Some(uri))
            }
        };
        if data.is_empty() {
            return Err(VeoGenError::UnexpectedResponse(format!(
                "operation {handle} returned an empty video"
            )));
        }

        let stem = filename_stem(request.prompt(), request.mode());
        let path = self.writer.write(&stem, self.clock.local_now(), &data).await?;
        let duration_ms = self.clock.now().saturating_duration_since(started).as_millis() as u64;

        Ok(VideoArtifact {
            path,
            size_bytes: data.len() as u64,
            mime_type: "video/mp4".to_string(),
            mode: request.mode(),
            metadata: VideoMetadata {
                model: Some(self.client.model_id().to_string()),
                operation: Some(handle),
                duration_ms: Some(duration_ms),
                video_duration_secs: Some(request.duration_secs()),
                source_uri,
            },
        })
    }
}

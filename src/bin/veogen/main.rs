//! CLI for Veogen - video generation with Google Veo.

mod interactive;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use veogen::video::poller::{DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL};
use veogen::{
    ArtifactWriter, GenerationOptions, GenerationRequest, OperationClient, PollPolicy, VeoClient,
    VeoConfig, VeoConfigBuilder, VeoGenError, VideoArtifact, VideoGenerator,
};

const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "veogen")]
#[command(about = "Generate videos with Google Veo via Vertex AI or the Gemini API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a video from flags
    Generate(GenerateArgs),

    /// Answer questions to generate a video
    Interactive(InteractiveArgs),

    /// Verify credentials and that the model endpoint is reachable
    Check,
}

#[derive(Args)]
struct BackendArgs {
    /// API backend [env: GOOGLE_GENAI_USE_VERTEXAI]
    #[arg(long, value_enum, global = true)]
    backend: Option<BackendArg>,

    /// GCP project ID [env: GOOGLE_CLOUD_PROJECT]
    #[arg(long, global = true)]
    project: Option<String>,

    /// GCP location [env: GOOGLE_CLOUD_LOCATION]
    #[arg(long, global = true)]
    location: Option<String>,

    /// Veo model identifier [env: VEO_MODEL_ID]
    #[arg(long, global = true)]
    model: Option<String>,

    /// Have the service write outputs to gs://<BUCKET>/videos/ [env: GCS_BUCKET]
    #[arg(long, global = true)]
    bucket: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Vertex,
    Gemini,
}

#[derive(Args)]
struct GenerateArgs {
    /// The text prompt describing the video
    #[arg(conflicts_with = "prompt_file")]
    prompt: Option<String>,

    /// Read the prompt from a file
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Reference image for image-to-video (PNG or JPEG)
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Video duration in seconds (5-8)
    #[arg(short, long, default_value_t = 5)]
    duration: u32,

    /// Aspect ratio (16:9 or 9:16)
    #[arg(long, default_value = "16:9")]
    aspect_ratio: String,

    /// What to avoid in the video
    #[arg(long)]
    negative_prompt: Option<String>,

    /// Do not let the service rewrite the prompt
    #[arg(long)]
    no_enhance: bool,

    /// Request an audio track (Veo 3 models)
    #[arg(long)]
    audio: bool,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct InteractiveArgs {
    /// Read the prompt from this file instead of asking
    prompt_file: Option<PathBuf>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct RunArgs {
    /// Directory for the generated MP4
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Seconds between status polls
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    poll_interval: u64,

    /// Give up after this many seconds (the remote job keeps running)
    #[arg(long, default_value_t = DEFAULT_MAX_WAIT.as_secs())]
    timeout: u64,

    /// Ask the service to cancel the operation on Ctrl-C
    #[arg(long)]
    cancel_on_interrupt: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    let json = cli.json;

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            let code = err
                .downcast_ref::<VeoGenError>()
                .map(VeoGenError::exit_code)
                .unwrap_or(1);
            report_error(&err, code, json);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Generate(args) => {
            let prompt = match (&args.prompt, &args.prompt_file) {
                (_, Some(path)) => std::fs::read_to_string(path)?,
                (Some(prompt), None) => prompt.clone(),
                (None, None) => String::new(),
            };
            let mut options = GenerationOptions::new(prompt)
                .with_duration(args.duration)
                .with_aspect_ratio(args.aspect_ratio.clone())
                .with_enhance_prompt(!args.no_enhance);
            if let Some(image) = &args.image {
                options = options.with_image(image);
            }
            if let Some(negative) = &args.negative_prompt {
                options = options.with_negative_prompt(negative);
            }
            if args.audio {
                options = options.with_generate_audio(true);
            }

            // Parameters are checked before credentials are resolved.
            let request = options.validate().map_err(VeoGenError::from)?;
            let config = load_config(&cli.backend)?;
            generate(config, request, &args.run, cli.json).await
        }
        Commands::Interactive(args) => {
            let stdin = std::io::stdin();
            // Keep stdout clean for the JSON result.
            let options = if cli.json {
                interactive::Session::new(stdin.lock(), std::io::stderr())
                    .gather(args.prompt_file.as_deref())?
            } else {
                println!("AI Video Generator using Google's Veo Models");
                interactive::Session::new(stdin.lock(), std::io::stdout())
                    .gather(args.prompt_file.as_deref())?
            };
            let Some(options) = options else {
                eprintln!("No image provided. Exiting.");
                return Ok(ExitCode::FAILURE);
            };

            let request = options.validate().map_err(VeoGenError::from)?;
            let config = load_config(&cli.backend)?;
            generate(config, request, &args.run, cli.json).await
        }
        Commands::Check => {
            let config = load_config(&cli.backend)?;
            check(config, cli.json).await
        }
    }
}

fn load_config(args: &BackendArgs) -> anyhow::Result<VeoConfig> {
    let mut builder = VeoConfigBuilder::from_env();
    if let Some(backend) = args.backend {
        builder = builder.use_vertex(matches!(backend, BackendArg::Vertex));
    }
    if let Some(project) = &args.project {
        builder = builder.project(project);
    }
    if let Some(location) = &args.location {
        builder = builder.location(location);
    }
    if let Some(model) = &args.model {
        builder = builder.model(model);
    }
    if let Some(bucket) = &args.bucket {
        builder = builder.storage_bucket(bucket);
    }
    let config = builder.build()?;

    tracing::debug!(
        backend = config.backend().as_str(),
        model = config.model(),
        credentials = %config.credentials().describe(),
        "Loaded configuration"
    );
    Ok(config)
}

async fn generate(
    config: VeoConfig,
    request: GenerationRequest,
    run: &RunArgs,
    json_output: bool,
) -> anyhow::Result<ExitCode> {
    let bucket = config.storage_bucket().map(str::to_string);
    let client: Arc<dyn OperationClient> = Arc::new(VeoClient::builder(config).build()?);
    let policy = PollPolicy::default()
        .with_interval(Duration::from_secs(run.poll_interval.max(1)))
        .with_max_wait(Duration::from_secs(run.timeout));
    let generator = VideoGenerator::from_arc(client)
        .with_poll_policy(policy)
        .with_writer(ArtifactWriter::new(&run.output_dir))
        .with_storage_bucket(bucket);

    if !json_output {
        println!("Starting video generation... This may take several minutes.");
    }

    let in_flight = generator.in_flight();
    let video = tokio::select! {
        result = generator.generate_request(request) => result?,
        _ = tokio::signal::ctrl_c() => {
            let handle = in_flight.borrow().clone();
            match handle {
                Some(handle) => {
                    tracing::warn!(
                        operation = %handle,
                        "Interrupted; the operation may still complete remotely"
                    );
                    if run.cancel_on_interrupt {
                        if let Err(e) = generator.client().cancel(&handle).await {
                            tracing::warn!(operation = %handle, "Cancel request failed: {e}");
                        }
                    }
                }
                None => tracing::warn!("Interrupted before the request was submitted"),
            }
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    };

    print_video(&video, json_output)?;
    Ok(ExitCode::SUCCESS)
}

fn print_video(video: &VideoArtifact, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        let result = serde_json::json!({
            "type": "video",
            "success": true,
            "output": video.path.display().to_string(),
            "size_bytes": video.size_bytes,
            "mode": video.mode,
            "model": video.metadata.model,
            "operation": video.metadata.operation,
            "duration_ms": video.metadata.duration_ms,
            "video_duration_secs": video.metadata.video_duration_secs,
            "source_uri": video.metadata.source_uri,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Generated video: {} ({} bytes) via {}",
            video.path.display(),
            video.size_bytes,
            video.metadata.model.as_deref().unwrap_or("veo")
        );
        if let Some(duration) = video.metadata.duration_ms {
            println!("Generation time: {}ms", duration);
        }
    }
    Ok(())
}

async fn check(config: VeoConfig, json_output: bool) -> anyhow::Result<ExitCode> {
    let backend = config.backend().clone();
    let model = config.model().to_string();
    let credentials = config.credentials().describe();
    let client = VeoClient::builder(config).build()?;
    client.health_check().await?;

    if json_output {
        let result = serde_json::json!({
            "success": true,
            "backend": backend.as_str(),
            "model": model,
            "credentials": credentials,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Backend: {}", backend.as_str());
        if let veogen::Backend::Vertex { project, location } = &backend {
            println!("Project: {project} ({location})");
        }
        println!("Model: {model}");
        println!("Credentials: {credentials}");
        println!("OK");
    }
    Ok(ExitCode::SUCCESS)
}

fn report_error(err: &anyhow::Error, code: i32, json_output: bool) {
    if json_output {
        let result = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "exit_code": code,
        });
        println!("{result}");
        return;
    }

    eprintln!("Error: {err}");
    match err.downcast_ref::<VeoGenError>() {
        Some(VeoGenError::Timeout { operation, .. }) => {
            eprintln!("The operation may still finish. Operation name: {operation}");
        }
        Some(VeoGenError::Auth(_)) => {
            eprintln!(
                "Set GOOGLE_ACCESS_TOKEN or GOOGLE_APPLICATION_CREDENTIALS, \
                 or run `gcloud auth login`."
            );
        }
        _ => {}
    }
}

//! Question-and-answer flow for `veogen interactive`.

use anyhow::{bail, Context};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use veogen::video::request::{DEFAULT_DURATION_SECS, MAX_DURATION_SECS, MIN_DURATION_SECS};
use veogen::{AspectRatio, GenerationMode, GenerationOptions};

/// Reads answers from `input` and writes questions to `output`.
pub struct Session<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Session<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Asks everything needed for one generation.
    ///
    /// Returns `None` when image mode is chosen but no usable image path is given.
    pub fn gather(&mut self, prompt_file: Option<&Path>) -> anyhow::Result<Option<GenerationOptions>> {
        self.say("Choose your video generation method:")?;
        self.say("1. Text-to-Video (Generate video from text prompt)")?;
        self.say("2. Image-to-Video (Generate video from image + text)")?;
        let mode = self.mode()?;

        let mut options = self.parameters()?;
        if mode == GenerationMode::ImageToVideo {
            match self.image_path()? {
                Some(path) => options.image = Some(path),
                None => return Ok(None),
            }
        }
        options.prompt = self.prompt(prompt_file)?;
        Ok(Some(options))
    }

    fn mode(&mut self) -> anyhow::Result<GenerationMode> {
        loop {
            match self.ask("\nEnter your choice (1 or 2): ")?.as_str() {
                "1" => return Ok(GenerationMode::TextToVideo),
                "2" => return Ok(GenerationMode::ImageToVideo),
                _ => self.say("Invalid choice. Please enter 1 or 2.")?,
            }
        }
    }

    /// Optional parameters; anything unusable falls back to the default.
    fn parameters(&mut self) -> anyhow::Result<GenerationOptions> {
        self.say("\nOptional Parameters (press Enter to use defaults):")?;

        let answer = self.ask(&format!(
            "Video duration in seconds ({MIN_DURATION_SECS}-{MAX_DURATION_SECS}, default: {DEFAULT_DURATION_SECS}): "
        ))?;
        let duration_secs = if answer.is_empty() {
            DEFAULT_DURATION_SECS
        } else {
            match answer.parse::<i64>() {
                Ok(n) if (MIN_DURATION_SECS as i64..=MAX_DURATION_SECS as i64).contains(&n) => n as u32,
                Ok(_) => {
                    self.say(&format!(
                        "Duration must be between {MIN_DURATION_SECS}-{MAX_DURATION_SECS} seconds. \
                         Using default: {DEFAULT_DURATION_SECS}"
                    ))?;
                    DEFAULT_DURATION_SECS
                }
                Err(_) => {
                    self.say(&format!("Invalid duration. Using default: {DEFAULT_DURATION_SECS}"))?;
                    DEFAULT_DURATION_SECS
                }
            }
        };

        let aspect_ratio = self
            .ask("Aspect ratio (16:9 or 9:16, default: 16:9): ")?
            .parse::<AspectRatio>()
            .unwrap_or_default();

        let negative = self.ask("Negative prompt (what to avoid): ")?;
        let enhance = self.ask("Use enhanced prompts? (y/n, default: y): ")?;

        Ok(GenerationOptions {
            duration_secs,
            aspect_ratio: aspect_ratio.as_str().to_string(),
            negative_prompt: (!negative.is_empty()).then_some(negative),
            enhance_prompt: !enhance.eq_ignore_ascii_case("n"),
            ..GenerationOptions::default()
        })
    }

    /// The prompt comes from `prompt_file` when given, otherwise from input.
    fn prompt(&mut self, prompt_file: Option<&Path>) -> anyhow::Result<String> {
        self.say("\nEnter your video description:")?;
        let mut prompt = match prompt_file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read prompt file {}", path.display()))?;
                self.say(&format!("Prompt: {}", text.trim()))?;
                text.trim().to_string()
            }
            None => self.ask("Prompt: ")?,
        };
        while prompt.is_empty() {
            self.say("Please enter a valid prompt.")?;
            prompt = self.ask("Prompt: ")?;
        }
        Ok(prompt)
    }

    /// Re-asks until the path exists; a blank answer gives up.
    fn image_path(&mut self) -> anyhow::Result<Option<PathBuf>> {
        self.say("\nEnter the path to your image file:")?;
        let mut answer = self.ask("Image path: ")?;
        while !Path::new(&answer).exists() {
            self.say(&format!("File not found: {answer}"))?;
            answer = self.ask("Please enter a valid image path: ")?;
            if answer.is_empty() {
                return Ok(None);
            }
        }
        Ok(Some(PathBuf::from(answer)))
    }

    fn ask(&mut self, question: &str) -> anyhow::Result<String> {
        write!(self.output, "{question}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            bail!("input closed before all questions were answered");
        }
        Ok(line.trim().to_string())
    }

    fn say(&mut self, message: &str) -> anyhow::Result<()> {
        writeln!(self.output, "{message}")?;
        Ok(())
    }
}

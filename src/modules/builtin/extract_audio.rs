use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::params::{ParamError, Params};
use crate::modules::builtin::process::{ffmpeg_binary, run_tool};
use crate::modules::{ExecContext, IoContract, IoSpec, IoType, Module, ModuleResult};

const VIDEO_PATTERNS: &[&str] = &["*.mp4", "*.mov", "*.mkv", "*.webm", "*.avi"];

/// Extract the audio track of a video with ffmpeg.
pub struct ExtractAudioModule;

struct Settings<'a> {
    input: &'a str,
    output_file: String,
    sample_rate: u64,
    channels: u64,
    codec: &'static str,
}

impl ExtractAudioModule {
    fn settings<'a>(&self, params: &'a Params) -> Result<Settings<'a>, ParamError> {
        let input = params.require_str("input")?;
        let output = params.require_str("output")?;

        let output_file = match params.get_str("outputFile")? {
            Some(f) if !f.is_empty() => f.to_string(),
            _ => Path::new(output).join("audio.wav").to_string_lossy().to_string(),
        };

        let codec = codec_for(&output_file).ok_or_else(|| {
            ParamError::invalid("outputFile", "extension must be .wav, .mp3 or .flac")
        })?;

        let sample_rate = params.get_u64("sampleRate")?.unwrap_or(16_000);
        if !(8_000..=192_000).contains(&sample_rate) {
            return Err(ParamError::invalid(
                "sampleRate",
                format!("{} Hz is outside 8000..=192000", sample_rate),
            ));
        }

        let channels = params.get_u64("channels")?.unwrap_or(1);
        if !(1..=2).contains(&channels) {
            return Err(ParamError::invalid("channels", "must be 1 or 2"));
        }

        Ok(Settings {
            input,
            output_file,
            sample_rate,
            channels,
            codec,
        })
    }
}

fn codec_for(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "wav" => Some("pcm_s16le"),
        "mp3" => Some("libmp3lame"),
        "flac" => Some("flac"),
        _ => None,
    }
}

#[async_trait]
impl Module for ExtractAudioModule {
    fn name(&self) -> &str {
        "extract-audio"
    }

    fn description(&self) -> &str {
        "Extract the audio track of a video file"
    }

    fn io(&self) -> IoContract {
        IoContract {
            required_inputs: vec![IoSpec::new(
                "input",
                "Source video",
                IoType::File,
                VIDEO_PATTERNS,
            )],
            optional_inputs: vec![],
            produced_outputs: vec![IoSpec::new(
                "audio",
                "Extracted audio track",
                IoType::File,
                &["*.wav", "*.mp3", "*.flac"],
            )],
        }
    }

    fn validate(&self, params: &Params) -> Result<(), ParamError> {
        self.settings(params).map(|_| ())
    }

    async fn execute(&self, ctx: &ExecContext, params: &Params) -> Result<ModuleResult> {
        let settings = self.settings(params)?;

        if let Some(parent) = Path::new(&settings.output_file).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args: Vec<String> = vec![
            "-y".into(),
            "-i".into(),
            settings.input.into(),
            "-vn".into(),
            "-ac".into(),
            settings.channels.to_string(),
            "-ar".into(),
            settings.sample_rate.to_string(),
            "-acodec".into(),
            settings.codec.into(),
            settings.output_file.clone(),
        ];
        run_tool(&ffmpeg_binary(), &args, ctx).await?;

        let size = tokio::fs::metadata(&settings.output_file).await?.len();

        Ok(ModuleResult::new()
            .with_output("audio", settings.output_file.clone())
            .with_metadata("source", settings.input)
            .with_metadata("codec", settings.codec)
            .with_statistic("sample_rate", settings.sample_rate)
            .with_statistic("channels", settings.channels)
            .with_statistic("bytes", size))
    }
}

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::engine::params::{ParamError, Params};
use crate::modules::builtin::process::{ffmpeg_binary, run_tool};
use crate::modules::{ExecContext, IoContract, IoSpec, IoType, Module, ModuleResult};

const SEGMENTS: &str = "segments";
const PART_PREFIX: &str = "part_";

/// Split an audio file into fixed-length segments with ffmpeg.
pub struct SplitModule;

impl SplitModule {
    /// The directory's last component must stay `segments` so later steps
    /// can pick it up by the declared output pattern.
    fn segments_dir(params: &Params) -> Result<PathBuf, ParamError> {
        let output = params.require_str("output")?;
        let dir = match params.get_str("segmentsDir")? {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => Path::new(output).join(SEGMENTS),
        };
        if dir.file_name().and_then(|n| n.to_str()) != Some(SEGMENTS) {
            return Err(ParamError::invalid(
                "segmentsDir",
                "last path component must be 'segments'",
            ));
        }
        Ok(dir)
    }

    fn segment_seconds(params: &Params) -> Result<u64, ParamError> {
        let seconds = params.get_u64("segmentSeconds")?.unwrap_or(600);
        if seconds == 0 {
            return Err(ParamError::invalid("segmentSeconds", "must be greater than 0"));
        }
        Ok(seconds)
    }
}

#[async_trait]
impl Module for SplitModule {
    fn name(&self) -> &str {
        "split"
    }

    fn description(&self) -> &str {
        "Split audio into fixed-length segments"
    }

    fn io(&self) -> IoContract {
        IoContract {
            required_inputs: vec![IoSpec::new(
                "input",
                "Audio to split",
                IoType::File,
                &["*.wav", "*.mp3", "*.flac"],
            )],
            optional_inputs: vec![],
            produced_outputs: vec![IoSpec::new(
                "segments",
                "Directory of audio segments",
                IoType::Directory,
                &[SEGMENTS],
            )],
        }
    }

    fn validate(&self, params: &Params) -> Result<(), ParamError> {
        params.require_str("input")?;
        Self::segments_dir(params)?;
        Self::segment_seconds(params)?;
        Ok(())
    }

    async fn execute(&self, ctx: &ExecContext, params: &Params) -> Result<ModuleResult> {
        let input = params.require_str("input")?;
        let dir = Self::segments_dir(params)?;
        let seconds = Self::segment_seconds(params)?;

        tokio::fs::create_dir_all(&dir).await?;
        let stale = clear_parts(&dir).await?;
        if stale > 0 {
            debug!(step = %ctx.step, removed = stale, "Removed segments of an earlier run");
        }

        let ext = Path::new(input)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("wav");
        let pattern = dir.join(format!("{}%03d.{}", PART_PREFIX, ext));

        let args: Vec<String> = vec![
            "-y".into(),
            "-i".into(),
            input.into(),
            "-f".into(),
            "segment".into(),
            "-segment_time".into(),
            seconds.to_string(),
            "-c".into(),
            "copy".into(),
            pattern.to_string_lossy().to_string(),
        ];
        run_tool(&ffmpeg_binary(), &args, ctx).await?;

        let count = part_files(&dir).await?.len() as u64;

        Ok(ModuleResult::new()
            .with_output("segments", dir.to_string_lossy().to_string())
            .with_metadata("source", input)
            .with_statistic("segment_count", count)
            .with_statistic("segment_seconds", seconds))
    }
}

async fn part_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut parts = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().starts_with(PART_PREFIX) {
            parts.push(entry.path());
        }
    }
    Ok(parts)
}

/// Delete segment files left in `dir` by an earlier run.
async fn clear_parts(dir: &Path) -> Result<usize> {
    let parts = part_files(dir).await?;
    for part in &parts {
        tokio::fs::remove_file(part).await?;
    }
    Ok(parts.len())
}

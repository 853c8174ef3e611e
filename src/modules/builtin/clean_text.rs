use std::path::Path;

use anyhow::{Context as _, Result};
use async_trait::async_trait;

use crate::engine::params::{ParamError, Params};
use crate::modules::{ExecContext, IoContract, IoSpec, IoType, Module, ModuleResult};

/// Normalize a transcript: strip bracketed annotations such as `[Music]`,
/// collapse whitespace and runs of blank lines.
pub struct CleanTextModule;

#[derive(Debug, Clone, Copy)]
pub struct CleanOptions {
    pub remove_bracketed: bool,
    pub lowercase: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            remove_bracketed: true,
            lowercase: false,
        }
    }
}

pub fn clean_text(source: &str, options: CleanOptions) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut last_blank = true;

    for raw in source.lines() {
        let stripped = if options.remove_bracketed {
            strip_bracketed(raw)
        } else {
            raw.to_string()
        };
        let mut line = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        if options.lowercase {
            line = line.to_lowercase();
        }

        if line.is_empty() {
            if !last_blank {
                lines.push(String::new());
            }
            last_blank = true;
        } else {
            lines.push(line);
            last_blank = false;
        }
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

fn strip_bracketed(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut depth = 0usize;
    for c in line.chars() {
        match c {
            '[' => depth += 1,
            ']' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

impl CleanTextModule {
    fn options(params: &Params) -> Result<CleanOptions, ParamError> {
        let defaults = CleanOptions::default();
        Ok(CleanOptions {
            remove_bracketed: params
                .get_bool("removeBracketed")?
                .unwrap_or(defaults.remove_bracketed),
            lowercase: params.get_bool("lowercase")?.unwrap_or(defaults.lowercase),
        })
    }

    fn output_file(params: &Params) -> Result<String, ParamError> {
        if let Some(file) = params.get_str("outputFile")?
            && !file.is_empty()
        {
            return Ok(file.to_string());
        }
        let input = params.require_str("input")?;
        let output = params.require_str("output")?;
        let stem = Path::new(input)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("transcript");
        Ok(Path::new(output)
            .join(format!("{}.clean.txt", stem))
            .to_string_lossy()
            .to_string())
    }
}

#[async_trait]
impl Module for CleanTextModule {
    fn name(&self) -> &str {
        "clean-text"
    }

    fn description(&self) -> &str {
        "Clean up a transcript text file"
    }

    fn io(&self) -> IoContract {
        IoContract {
            required_inputs: vec![IoSpec::new("input", "Transcript", IoType::File, &["*.txt"])],
            optional_inputs: vec![],
            produced_outputs: vec![IoSpec::new(
                "text",
                "Cleaned transcript",
                IoType::File,
                &["*.txt"],
            )],
        }
    }

    fn validate(&self, params: &Params) -> Result<(), ParamError> {
        params.require_str("input")?;
        Self::options(params)?;
        Self::output_file(params)?;
        Ok(())
    }

    async fn execute(&self, _ctx: &ExecContext, params: &Params) -> Result<ModuleResult> {
        let input = params.require_str("input")?;
        let options = Self::options(params)?;
        let output_file = Self::output_file(params)?;

        let source = tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read transcript: {}", input))?;
        let cleaned = clean_text(&source, options);

        if let Some(parent) = Path::new(&output_file).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&output_file, &cleaned)
            .await
            .with_context(|| format!("Failed to write cleaned text: {}", output_file))?;

        Ok(ModuleResult::new()
            .with_output("text", output_file.clone())
            .with_metadata("source", input)
            .with_statistic("lines_in", source.lines().count())
            .with_statistic("lines_out", cleaned.lines().count())
            .with_statistic(
                "chars_removed",
                source.chars().count().saturating_sub(cleaned.chars().count()),
            ))
    }
}

//! Line-oriented input and output files.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use token_chain::{PipelineReport, StageReport};

use crate::error::{AppError, Result};

/// Read `path` and return its non-blank lines, trimmed.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path).map_err(|e| AppError::read(path, e))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Write one line per item, replacing any existing file.
pub fn write_lines<'a>(path: &Path, lines: impl IntoIterator<Item = &'a str>) -> Result<usize> {
    let file = File::create(path).map_err(|e| AppError::write(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;
    for line in lines {
        writeln!(writer, "{line}").map_err(|e| AppError::write(path, e))?;
        written += 1;
    }
    writer.flush().map_err(|e| AppError::write(path, e))?;
    Ok(written)
}

#[derive(Serialize)]
struct ReportFile<'a> {
    cancelled: bool,
    tokens: usize,
    stages: &'a [StageReport],
}

/// Dump stage summaries and failures, correlated to credential ordinals.
pub fn write_report(path: &Path, report: &PipelineReport) -> Result<()> {
    let file = File::create(path).map_err(|e| AppError::write(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(
        &mut writer,
        &ReportFile {
            cancelled: report.cancelled,
            tokens: report.tokens.len(),
            stages: &report.stages,
        },
    )?;
    writer.flush().map_err(|e| AppError::write(path, e))?;
    Ok(())
}

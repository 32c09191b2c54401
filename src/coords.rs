//! Coordinate offset file parsing.
//!
//! Line 1 holds the X offset, line 2 the Y offset. Carriage returns left by
//! Windows editors are stripped. Z is resolved later from the terrain model.
use crate::error::PlanError;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoordinateOffset {
    pub x: f64,
    pub y: f64,
}

impl CoordinateOffset {
    /// Always zero at this layer; elevation comes from the DTM stage.
    pub const Z: f64 = 0.0;
}

pub fn read_offset(path: &Path) -> Result<CoordinateOffset, PlanError> {
    let malformed = |reason: String| PlanError::MalformedCoordinateFile {
        path: path.to_path_buf(),
        reason,
    };
    let text = fs::read_to_string(path).map_err(|err| malformed(format!("read failed: {err}")))?;
    parse_offset(&text).map_err(malformed)
}

pub fn parse_offset(text: &str) -> Result<CoordinateOffset, String> {
    let mut lines = text.split('\n');
    let x = parse_line(lines.next(), "X", 1)?;
    let y = parse_line(lines.next(), "Y", 2)?;
    Ok(CoordinateOffset { x, y })
}

fn parse_line(line: Option<&str>, axis: &str, number: usize) -> Result<f64, String> {
    let raw = line
        .map(|line| line.trim_end_matches('\r').trim())
        .filter(|line| !line.is_empty())
        .ok_or_else(|| format!("line {number} ({axis} offset) is missing"))?;
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("line {number} ({axis} offset) is not a number: {raw:?}"))?;
    if !value.is_finite() {
        return Err(format!("line {number} ({axis} offset) is not finite: {raw:?}"));
    }
    Ok(value)
}

//! Multi-compound reference files (NIST text export and AMDIS `.msl`).
//!
//! ```text
//! NAME: Octane
//! RT: 7.21
//! FORMULA: C8H18
//! NUM PEAKS: 3
//! 43 999
//! (57 620) (85 120)
//!
//! NAME: ...
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::ParsedCompound;
use crate::errors::{
    GcmsError,
    Result,
};

static PAREN_PEAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*([-+0-9.eE]+)[\s,]+([-+0-9.eE]+)\s*\)").expect("static regex is valid")
});

enum Section {
    /// Before the first record or after a record was closed by a blank line.
    Outside,
    Metadata,
    Peaks,
}

fn is_name_line(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    match (trimmed.get(..5), trimmed.get(5..)) {
        (Some(head), Some(rest)) if head.eq_ignore_ascii_case("NAME:") => Some(rest.trim()),
        _ => None,
    }
}

fn is_num_peaks_line(line: &str) -> bool {
    line.to_ascii_uppercase().contains("NUM PEAKS")
}

pub(super) fn looks_like_records(text: &str) -> bool {
    text.lines()
        .filter(|l| !l.starts_with('#'))
        .any(|l| is_name_line(l).is_some())
}

fn parse_number(token: &str, line_no: usize, path: &Path) -> Result<f64> {
    token.parse::<f64>().map_err(|_| {
        GcmsError::format(
            format!("line {}: '{}' is not a number", line_no, token),
            Some(path.to_path_buf()),
        )
    })
}

fn check_intensity(value: f64, line_no: usize, path: &Path) -> Result<f64> {
    if value < 0.0 || !value.is_finite() {
        return Err(GcmsError::format(
            format!("line {}: invalid peak intensity {}", line_no, value),
            Some(path.to_path_buf()),
        ));
    }
    Ok(value)
}

/// Parses one peak line, in either parenthesized or whitespace form.
fn parse_peak_line(
    line: &str,
    line_no: usize,
    path: &Path,
    out: &mut Vec<(f64, f64)>,
) -> Result<()> {
    if line.contains('(') {
        let mut found = 0;
        for cap in PAREN_PEAK.captures_iter(line) {
            let mass = parse_number(&cap[1], line_no, path)?;
            let inten = check_intensity(parse_number(&cap[2], line_no, path)?, line_no, path)?;
            out.push((mass, inten));
            found += 1;
        }
        let leftover = PAREN_PEAK.replace_all(line, "");
        if found == 0 || !leftover.trim().is_empty() {
            return Err(GcmsError::format(
                format!("line {}: malformed peak list '{}'", line_no, line.trim()),
                Some(path.to_path_buf()),
            ));
        }
        return Ok(());
    }

    // MSP style lines may hold several `mass intensity;` chunks.
    for chunk in line.split(';').filter(|c| !c.trim().is_empty()) {
        let mut tokens = chunk.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some(m), Some(i)) => {
                let mass = parse_number(m, line_no, path)?;
                let inten = check_intensity(parse_number(i, line_no, path)?, line_no, path)?;
                out.push((mass, inten));
            }
            _ => {
                return Err(GcmsError::format(
                    format!("line {}: malformed peak line '{}'", line_no, line.trim()),
                    Some(path.to_path_buf()),
                ));
            }
        }
    }
    Ok(())
}

fn finish_record(
    current: Option<(ParsedCompound, bool)>,
    out: &mut Vec<ParsedCompound>,
    path: &Path,
) -> Result<()> {
    if let Some((compound, saw_peaks)) = current {
        if !saw_peaks {
            return Err(GcmsError::format(
                format!("record '{}' has no NUM PEAKS section", compound.name),
                Some(path.to_path_buf()),
            ));
        }
        out.push(compound);
    }
    Ok(())
}

pub(super) fn parse_records(text: &str, path: &Path) -> Result<Vec<ParsedCompound>> {
    let mut out = Vec::new();
    let mut current: Option<(ParsedCompound, bool)> = None;
    let mut section = Section::Outside;

    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        if line.starts_with('#') {
            continue;
        }

        if let Some(name) = is_name_line(line) {
            finish_record(current.take(), &mut out, path)?;
            if name.is_empty() {
                return Err(GcmsError::format(
                    format!("line {}: empty compound name", line_no),
                    Some(path.to_path_buf()),
                ));
            }
            current = Some((
                ParsedCompound {
                    name: name.to_string(),
                    metadata: HashMap::new(),
                    peaks: Vec::new(),
                },
                false,
            ));
            section = Section::Metadata;
            continue;
        }

        if line.trim().is_empty() {
            section = Section::Outside;
            continue;
        }

        match section {
            Section::Outside => {
                debug!("Ignoring line {} outside of a record", line_no);
            }
            Section::Metadata => {
                let Some((compound, saw_peaks)) = current.as_mut() else {
                    continue;
                };
                if is_num_peaks_line(line) {
                    *saw_peaks = true;
                    section = Section::Peaks;
                    continue;
                }
                let Some((key, value)) = line.split_once(':') else {
                    return Err(GcmsError::format(
                        format!("line {}: expected 'KEY: value', got '{}'", line_no, line.trim()),
                        Some(path.to_path_buf()),
                    ));
                };
                compound
                    .metadata
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
            Section::Peaks => {
                if let Some((compound, _)) = current.as_mut() {
                    parse_peak_line(line, line_no, path, &mut compound.peaks)?;
                }
            }
        }
    }
    finish_record(current.take(), &mut out, path)?;

    Ok(out)
}

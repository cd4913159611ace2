//! Manifest of single-compound reference files.
//!
//! The manifest lists one file name per line, relative to the manifest's
//! own directory. Each listed file holds `mass intensity` rows. The
//! compound name is the file name without its extension.

use std::collections::HashMap;
use std::path::{
    Path,
    PathBuf,
};

use tracing::warn;

use super::ParsedCompound;
use crate::errors::{
    GcmsError,
    Result,
};

fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'))
}

/// Reference file paths named by a manifest, in manifest order.
pub(super) fn manifest_entries(text: &str, manifest_path: &Path) -> Vec<PathBuf> {
    let base = manifest_path.parent().unwrap_or_else(|| Path::new(""));
    content_lines(text).map(|(_, l)| base.join(l)).collect()
}

pub(super) fn parse_reference_file(path: &Path) -> Result<ParsedCompound> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| GcmsError::format("reference file has no name", Some(path.to_path_buf())))?;

    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GcmsError::lookup(
                name.clone(),
                format!("reference file {} is not on disk", path.display()),
            )
        } else {
            GcmsError::io(e, path)
        }
    })?;
    let text = String::from_utf8_lossy(&bytes);

    let mut peaks = Vec::new();
    for (line_no, line) in content_lines(&text) {
        let mut tokens = line.split_whitespace();
        let parsed = match (tokens.next(), tokens.next()) {
            (Some(m), Some(i)) => m.parse::<f64>().ok().zip(i.parse::<f64>().ok()),
            _ => None,
        };
        match parsed {
            Some((mass, inten)) if inten >= 0.0 && inten.is_finite() && mass.is_finite() => {
                peaks.push((mass, inten))
            }
            _ => {
                return Err(GcmsError::format(
                    format!("line {}: malformed peak line '{}'", line_no, line),
                    Some(path.to_path_buf()),
                ));
            }
        }
    }

    Ok(ParsedCompound {
        name,
        metadata: HashMap::new(),
        peaks,
    })
}

/// Parses every listed reference, skipping entries whose file is missing.
///
/// Returns the parsed compounds and the names of the skipped entries. A
/// manifest where nothing resolves fails with the first lookup error.
pub(super) fn parse_manifest(
    text: &str,
    manifest_path: &Path,
) -> Result<(Vec<ParsedCompound>, Vec<String>)> {
    let mut compounds = Vec::new();
    let mut skipped = Vec::new();
    let mut first_missing = None;
    for path in manifest_entries(text, manifest_path) {
        match parse_reference_file(&path) {
            Ok(c) => compounds.push(c),
            Err(GcmsError::Lookup { name, context }) => {
                warn!("Skipping reference '{}': {}", name, context);
                skipped.push(name.clone());
                first_missing.get_or_insert(GcmsError::Lookup { name, context });
            }
            Err(e) => return Err(e),
        }
    }
    match first_missing {
        Some(err) if compounds.is_empty() => Err(err),
        _ => Ok((compounds, skipped)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_manifest_reads_listed_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("octane.txt"),
            "# mass intensity\n43 999\n\n57 620.5\n",
        )
        .unwrap();
        fs::write(dir.path().join("nonane.txt"), "43\t999\n").unwrap();
        let manifest = dir.path().join("reference_files.txt");
        let text = "# references\noctane.txt\n\nnonane.txt\n";
        fs::write(&manifest, text).unwrap();

        let (compounds, skipped) = parse_manifest(text, &manifest).unwrap();
        assert!(skipped.is_empty());
        assert_eq!(compounds.len(), 2);
        assert_eq!(compounds[0].name, "octane");
        assert_eq!(compounds[0].peaks, vec![(43.0, 999.0), (57.0, 620.5)]);
        assert_eq!(compounds[1].name, "nonane");
    }

    #[test]
    fn test_missing_reference_is_lookup_error() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("reference_files.txt");
        let res = parse_manifest("ghost.txt\n", &manifest);
        assert!(matches!(res, Err(GcmsError::Lookup { .. })));
    }

    #[test]
    fn test_missing_entry_skips_only_that_compound() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("octane.txt"), "43 999\n").unwrap();
        let manifest = dir.path().join("reference_files.txt");
        let (compounds, skipped) = parse_manifest("octane.txt\nghost.txt\n", &manifest).unwrap();
        assert_eq!(compounds.len(), 1);
        assert_eq!(compounds[0].name, "octane");
        assert_eq!(skipped, vec!["ghost".to_string()]);
    }

    #[test]
    fn test_malformed_reference_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.txt"), "43 999\n57\n").unwrap();
        let manifest = dir.path().join("reference_files.txt");
        let res = parse_manifest("bad.txt\n", &manifest);
        assert!(matches!(res, Err(GcmsError::Format { .. })));
    }
}

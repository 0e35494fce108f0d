//! Output filename derivation shared by every strategy.
//!
//! The rule is the same regardless of which strategy serviced a request:
//! take the source's name, strip its final extension, and append the target
//! format's extension. Sources without a name get a fixed base name.
//!
//! - `holiday.jpg` + webp → `holiday.webp`
//! - `archive.tar.gz` + png → `archive.tar.png`
//! - `.hidden` + jpg → `.jpg` (the whole name is treated as an extension)
//! - no name + jpeg → `compressed-image.jpeg`
//!
//! Writing a batch to disk uses [`plan_output_paths`], which keeps each
//! input's relative directory and gives colliding stems (`a.png`, `a.jpg`)
//! their full original name (`a.png.webp`, `a.jpg.webp`).

use crate::types::{ImageSource, OutputFormat};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Base name used when the source carries no name of its own.
pub const DEFAULT_BASE_NAME: &str = "compressed-image";

/// Strip the final `.ext` from a name.
///
/// Only the last segment after a `/` is considered, so a dot in a directory
/// name is never mistaken for an extension.
pub fn strip_extension(name: &str) -> &str {
    let segment_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name[segment_start..].rfind('.') {
        Some(dot) if dot + segment_start + 1 < name.len() => &name[..segment_start + dot],
        _ => name,
    }
}

/// Derive the output filename for a source encoded as `format`.
pub fn derive_filename(source: &ImageSource, format: OutputFormat) -> String {
    let base = source
        .name()
        .map(strip_extension)
        .unwrap_or(DEFAULT_BASE_NAME);
    format!("{}.{}", base, format.extension())
}

/// Two inputs would be written to the same place.
#[derive(Error, Debug, PartialEq)]
#[error(
    "{} and {} would both be written to {}",
    .first.display(),
    .second.display(),
    .target.display()
)]
pub struct OutputCollision {
    pub first: PathBuf,
    pub second: PathBuf,
    pub target: PathBuf,
}

fn append_extension(path: &Path, format: OutputFormat) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(format.extension());
    PathBuf::from(name)
}

/// Output path, relative to the output directory, for each input path.
///
/// Inputs are relative paths; the result keeps their directories and has
/// one entry per input, in order.
pub fn plan_output_paths(
    relatives: &[PathBuf],
    format: OutputFormat,
) -> Result<Vec<PathBuf>, OutputCollision> {
    let plain: Vec<PathBuf> = relatives
        .iter()
        .map(|rel| rel.with_extension(format.extension()))
        .collect();
    let mut counts: HashMap<&Path, usize> = HashMap::new();
    for path in &plain {
        *counts.entry(path.as_path()).or_default() += 1;
    }
    let planned: Vec<PathBuf> = relatives
        .iter()
        .zip(&plain)
        .map(|(rel, path)| {
            if counts.get(path.as_path()).copied().unwrap_or(0) > 1 {
                append_extension(rel, format)
            } else {
                path.clone()
            }
        })
        .collect();

    let mut owners: HashMap<&Path, &Path> = HashMap::new();
    for (rel, target) in relatives.iter().zip(&planned) {
        if let Some(first) = owners.insert(target.as_path(), rel.as_path()) {
            return Err(OutputCollision {
                first: first.to_path_buf(),
                second: rel.clone(),
                target: target.clone(),
            });
        }
    }
    Ok(planned)
}

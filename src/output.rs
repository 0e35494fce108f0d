//! CLI output formatting.
//!
//! # Report levels
//!
//! Single results are shown at one of two levels:
//!
//! ```text
//! basic:     holiday.webp: 2.4 MB → 312.5 KB (87% smaller) via canvas
//! detailed:  holiday.webp via canvas
//!                Original:   2.4 MB
//!                Compressed: 312.5 KB
//!                Saved:      2.1 MB (87%)
//!                Format:     WEBP
//! ```
//!
//! # Batches
//!
//! ```text
//! [1/3] holiday.jpg
//!     → holiday.webp: 2.4 MB → 312.5 KB (87% smaller) via canvas
//! [2/3] broken.png
//!     ✗ canvas compression failed: decode failed: …
//!
//! Compressed 2 images: 4.8 MB → 610 KB, saved 4.2 MB (88%)
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::capabilities::Capabilities;
use crate::compressor::{BatchEvent, BatchSummary};
use crate::types::{CompressionStats, Method};

/// How much to print per compressed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportLevel {
    #[default]
    Basic,
    Detailed,
}

const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Human-readable byte count: 1024-based, one decimal, trailing `.0` dropped.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 10.0).round() / 10.0;
    format!("{} {}", rounded, UNITS[unit])
}

fn format_saved(saved: i64) -> String {
    if saved < 0 {
        format!("-{}", format_bytes(saved.unsigned_abs()))
    } else {
        format_bytes(saved as u64)
    }
}

fn change_label(ratio: i64) -> String {
    if ratio >= 0 {
        format!("{}% smaller", ratio)
    } else {
        format!("{}% larger", -ratio)
    }
}

/// Format one compressed image.
pub fn format_stats(
    filename: &str,
    method: Method,
    stats: &CompressionStats,
    level: ReportLevel,
) -> Vec<String> {
    match level {
        ReportLevel::Basic => vec![format!(
            "{}: {} → {} ({}) via {}",
            filename,
            format_bytes(stats.original_size),
            format_bytes(stats.compressed_size),
            change_label(stats.compression_ratio),
            method
        )],
        ReportLevel::Detailed => vec![
            format!("{} via {}", filename, method),
            format!("    Original:   {}", format_bytes(stats.original_size)),
            format!("    Compressed: {}", format_bytes(stats.compressed_size)),
            format!(
                "    Saved:      {} ({}%)",
                format_saved(stats.saved_bytes),
                stats.compression_ratio
            ),
            format!("    Format:     {}", stats.format),
        ],
    }
}

/// Format a single batch progress event as display lines.
pub fn format_batch_event(event: &BatchEvent, level: ReportLevel) -> Vec<String> {
    match event {
        BatchEvent::Started {
            index,
            total,
            label,
        } => vec![format!("[{}/{}] {}", index + 1, total, label)],
        BatchEvent::Finished {
            method,
            filename,
            stats,
            ..
        } => {
            let mut lines = format_stats(filename, *method, stats, level);
            if let Some(first) = lines.first_mut() {
                *first = format!("→ {}", first);
            }
            lines.into_iter().map(|l| format!("    {}", l)).collect()
        }
        BatchEvent::Failed { message, .. } => vec![format!("    ✗ {}", message)],
    }
}

/// Format the closing line of a batch.
pub fn format_batch_summary(summary: Option<&BatchSummary>, failed: usize) -> Vec<String> {
    let mut lines = Vec::new();
    match summary {
        Some(s) => lines.push(format!(
            "Compressed {} image{}: {} → {}, saved {} ({}%)",
            s.processed,
            if s.processed == 1 { "" } else { "s" },
            format_bytes(s.total_original),
            format_bytes(s.total_compressed),
            format_saved(s.total_saved),
            s.overall_ratio
        )),
        None => lines.push("No images compressed".to_string()),
    }
    if failed > 0 {
        lines.push(format!("{} failed", failed));
    }
    lines
}

pub fn print_batch_summary(summary: Option<&BatchSummary>, failed: usize) {
    println!();
    for line in format_batch_summary(summary, failed) {
        println!("{}", line);
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

/// Format the capability report of the `probe` command.
pub fn format_capabilities(capabilities: &Capabilities, selected: Method) -> Vec<String> {
    vec![
        "Capabilities".to_string(),
        format!("    Synchronous raster:  {}", yes_no(capabilities.synchronous_raster)),
        format!("    Background context:  {}", yes_no(capabilities.background_context)),
        format!("    Off-thread raster:   {}", yes_no(capabilities.off_thread_raster)),
        format!("    Codec engine:        {}", yes_no(capabilities.delegated_engine_loadable)),
        format!("    WebP encoding:       {}", yes_no(capabilities.next_gen_format_supported)),
        format!("Automatic method: {}", selected),
    ]
}

pub fn print_capabilities(capabilities: &Capabilities, selected: Method) {
    for line in format_capabilities(capabilities, selected) {
        println!("{}", line);
    }
}

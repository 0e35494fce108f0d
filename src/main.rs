use clap::{Parser, Subcommand};
use pixpress::config::{self, OptionsOverride, QualityPreset};
use pixpress::imaging::raster::supported_input_extensions;
use pixpress::naming::plan_output_paths;
use pixpress::output::{self, ReportLevel};
use pixpress::{BatchItem, Compressor, ImageSource};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "pixpress")]
#[command(about = "Shrink images under a size, quality and format budget")]
#[command(long_about = "\
Shrink images under a size, quality and format budget

Each image is decoded, scaled down to fit the optional bounding box and
re-encoded. The work runs on the best strategy the host allows:

  canvas       decode, scale and encode on the calling thread
  worker       the same pipeline on a persistent background thread
  wasm         the bundled codec engine, which also enforces a byte budget
  lightweight  nearest-neighbour scaling, no reliance on surface scaling

Run 'pixpress probe' to see which one is picked automatically, and
'pixpress gen-config' to generate a documented pixpress.toml.")]
#[command(version)]
struct Cli {
    /// Config file (optional; stock defaults apply when it is missing)
    #[arg(long, default_value = "pixpress.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Per-run option overrides. Unset flags fall back to the config file.
#[derive(clap::Args, Clone)]
struct OptionArgs {
    /// Quality from 0.0 to 1.0, or one of low, medium, high, lossless
    #[arg(long, value_parser = parse_quality)]
    quality: Option<f64>,

    /// Output format: webp, jpeg, jpg or png
    #[arg(long)]
    format: Option<String>,

    /// Maximum output width in pixels
    #[arg(long, allow_negative_numbers = true)]
    max_width: Option<i64>,

    /// Maximum output height in pixels
    #[arg(long, allow_negative_numbers = true)]
    max_height: Option<i64>,

    /// Force a strategy: canvas, worker, wasm or lightweight
    #[arg(long)]
    method: Option<String>,
}

impl OptionArgs {
    fn to_override(&self) -> OptionsOverride {
        OptionsOverride {
            quality: self.quality,
            format: self.format.clone(),
            max_width: self.max_width,
            max_height: self.max_height,
            preferred_method: self.method.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Compress image files and directories of images
    Compress {
        /// Files or directories; directories are searched recursively
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Where to write the compressed images; directory inputs keep
        /// their layout beneath it
        #[arg(long, default_value = "compressed")]
        out_dir: PathBuf,

        /// Print a detailed report per image
        #[arg(long)]
        detailed: bool,

        #[command(flatten)]
        options: OptionArgs,
    },
    /// Show detected host capabilities and the automatic strategy
    Probe,
    /// Print a stock pixpress.toml with all options documented
    GenConfig,
}

fn parse_quality(raw: &str) -> Result<f64, String> {
    if let Some(preset) = QualityPreset::parse(raw) {
        return Ok(preset.value());
    }
    raw.parse::<f64>()
        .map_err(|_| format!("`{}` is neither a number nor a quality preset", raw))
}

/// An input file and its path relative to the argument it came from.
struct InputFile {
    path: PathBuf,
    relative: PathBuf,
}

/// Expand directories into the image files beneath them, sorted for a
/// stable batch order.
fn collect_inputs(inputs: &[PathBuf]) -> Vec<InputFile> {
    let extensions = supported_input_extensions();
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            let relative = input
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| input.clone());
            files.push(InputFile {
                path: input.clone(),
                relative,
            });
            continue;
        }
        let mut found: Vec<PathBuf> = WalkDir::new(input)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| extensions.contains(&e.to_ascii_lowercase().as_str()))
            })
            .collect();
        found.sort();
        files.extend(found.into_iter().map(|path| InputFile {
            relative: path.strip_prefix(input).unwrap_or(path.as_path()).to_path_buf(),
            path,
        }));
    }
    files
}

/// Files are read inside the batch, so an unreadable one fails on its own.
fn file_source(path: &Path) -> ImageSource {
    ImageSource::Reference(format!("file://{}", path.display()))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let settings = config::load_config(&cli.config)?;

    match cli.command {
        Command::Compress {
            inputs,
            out_dir,
            detailed,
            options,
        } => {
            let level = if detailed {
                ReportLevel::Detailed
            } else {
                ReportLevel::Basic
            };
            let files = collect_inputs(&inputs);
            if files.is_empty() {
                return Err("no image files found".into());
            }
            let overrides = options.to_override();
            let format = settings.options.merge(&overrides).validate().format;
            let relatives: Vec<PathBuf> = files.iter().map(|f| f.relative.clone()).collect();
            let targets = plan_output_paths(&relatives, format)?;
            let sources = files.iter().map(|f| file_source(&f.path)).collect();

            let compressor = Compressor::from_config(&settings);
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_batch_event(&event, level) {
                        println!("{}", line);
                    }
                }
            });
            let result = compressor.compress_multiple_with_events(sources, &overrides, Some(&tx));
            drop(tx);
            compressor.destroy();
            printer.join().ok();

            for (item, target) in result.items.iter().zip(&targets) {
                if let BatchItem::Compressed(compressed) = item {
                    let target = out_dir.join(target);
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&target, &compressed.result.encoded)?;
                }
            }

            let failed = result.failures().count();
            output::print_batch_summary(result.summary().as_ref(), failed);
            if failed > 0 {
                return Err(format!("{} of {} images failed", failed, result.len()).into());
            }
        }
        Command::Probe => {
            let compressor = Compressor::from_config(&settings);
            let selected = compressor.selected_method(&OptionsOverride::default());
            output::print_capabilities(&compressor.capabilities(), selected);
            compressor.destroy();
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

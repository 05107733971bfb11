use clap::{Parser, Subcommand};
use magick_wrap::config;
use magick_wrap::magick::{
    Dimensions, Magick, MagickError, Resource, ScaleOptions, expected_dimensions, shrink_options,
};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions picked up when `batch` walks a directory.
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "tif", "tiff", "webp", "bmp", "avif", "heic",
];

/// Target geometry shared by the resize-family commands.
#[derive(clap::Args, Clone)]
struct ScaleArgs {
    /// Bounding-box width (requires --height)
    #[arg(long, requires = "height")]
    width: Option<u32>,
    /// Bounding-box height (requires --width)
    #[arg(long, requires = "width")]
    height: Option<u32>,
    /// Scale by percentage instead of a bounding box
    #[arg(long)]
    percent: Option<u32>,
    /// Encoding quality (1-100)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
    quality: Option<u32>,
    /// Never enlarge
    #[arg(long)]
    shrink_only: bool,
    /// Never reduce
    #[arg(long)]
    expand_only: bool,
    /// Use the exact box, ignoring aspect ratio
    #[arg(long)]
    ignore_aspect: bool,
}

impl ScaleArgs {
    fn to_options(&self) -> ScaleOptions {
        let mut options = ScaleOptions {
            width: self.width,
            height: self.height,
            percent: self.percent,
            shrink_only: self.shrink_only,
            expand_only: self.expand_only,
            absolute_aspect: self.ignore_aspect,
            ..ScaleOptions::default()
        };
        if let Some(q) = self.quality {
            options = options.with_quality(q);
        }
        options
    }
}

#[derive(clap::Args, Clone)]
struct ResizeArgs {
    /// Source image
    source: PathBuf,
    /// Destination image (may equal the source)
    dest: PathBuf,
    #[command(flatten)]
    scale: ScaleArgs,
}

#[derive(Parser)]
#[command(name = "magick-wrap")]
#[command(about = "Resize, probe and limit ImageMagick from the command line")]
#[command(long_about = "\
Resize, probe and limit ImageMagick from the command line

Every command runs the ImageMagick programs named in the config file
(convert, mogrify, identify) directly, without a shell.

Examples:

  magick-wrap resize in.jpg out.jpg --width 100 --height 100
  magick-wrap shrink in.jpg in.jpg --width 1000 --height 1000
  magick-wrap resize in.jpg half.jpg --percent 50 --quality 85
  magick-wrap size in.jpg out.jpg
  magick-wrap --limit memory=64mb limits --actual
  magick-wrap batch --out-dir thumbs --width 400 --height 400 photos/

Run 'magick-wrap gen-config' to generate a documented magick.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = "magick.toml", global = true)]
    config: PathBuf,

    /// Resource limit override, e.g. memory=64mb (repeatable)
    #[arg(long = "limit", value_parser = parse_limit, global = true)]
    limits: Vec<(Resource, String)>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resize an image to a bounding box or percentage
    Resize(ResizeArgs),
    /// Resize an image, never enlarging it
    Shrink(ResizeArgs),
    /// Resize an image, never reducing it
    Expand(ResizeArgs),
    /// Print the dimensions of one or more images
    Size {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the effective resource limits
    Limits {
        /// Show absolute counts instead of symbolic sizes
        #[arg(long)]
        actual: bool,
        /// Show the engine's own defaults, ignoring overrides
        #[arg(long)]
        defaults: bool,
    },
    /// Shrink many images into an output directory in parallel
    Batch {
        /// Output directory
        #[arg(long)]
        out_dir: PathBuf,
        #[command(flatten)]
        scale: ScaleArgs,
        /// Report the sizes each image would get without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Image files or directories to walk
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Print a stock magick.toml with all options documented
    GenConfig,
}

fn parse_limit(s: &str) -> Result<(Resource, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected RESOURCE=VALUE, got `{s}`"))?;
    let resource: Resource = key.parse().map_err(|e: MagickError| e.to_string())?;
    Ok((resource, value.trim().to_string()))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("MAGICK_WRAP_LOG", "warn"))
        .init();

    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(&cli.config)?;
    let mut magick = Magick::from_config(&config)?;
    magick.set_limits(cli.limits.clone())?;

    match &cli.command {
        Command::Resize(args) => {
            let dest = magick.resize(&args.source, &args.dest, &args.scale.to_options())?;
            report_written(&magick, &dest, cli.json)?;
        }
        Command::Shrink(args) => {
            let dest = magick.shrink(&args.source, &args.dest, &args.scale.to_options())?;
            report_written(&magick, &dest, cli.json)?;
        }
        Command::Expand(args) => {
            let dest = magick.expand(&args.source, &args.dest, &args.scale.to_options())?;
            report_written(&magick, &dest, cli.json)?;
        }
        Command::Size { files } => {
            let mut report = Vec::new();
            for file in files {
                report.push(SizeReport {
                    file: file.clone(),
                    size: magick.image_size(file)?,
                });
            }
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for entry in &report {
                    println!("{}: {}", entry.file.display(), format_size(entry.size));
                }
            }
        }
        Command::Limits { actual, defaults } => {
            let table = if *defaults {
                let base = magick.default_limits().clone();
                if *actual {
                    base.into_iter().map(|(r, v)| (r, v.to_actual())).collect()
                } else {
                    base
                }
            } else {
                magick.current_limits(*actual)
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&table)?);
            } else {
                for (resource, value) in &table {
                    let marker = if magick.limits().get(*resource).is_some() && !*defaults {
                        " (override)"
                    } else {
                        ""
                    };
                    println!("{:<8} {}{}", resource, value, marker);
                }
            }
        }
        Command::Batch {
            out_dir,
            scale,
            dry_run,
            inputs,
        } => {
            init_thread_pool(&config.processing);
            let jobs = plan_batch(inputs, out_dir);
            let clashes = shared_destinations(&jobs);
            let options = scale.to_options();
            let results: Vec<BatchReport> = jobs
                .par_iter()
                .map(|job| {
                    if clashes.contains(&job.dest) {
                        job.report(Err(format!(
                            "destination {} is shared with another input",
                            job.dest.display()
                        )))
                    } else {
                        let result = shrink_job(&magick, job, &options, *dry_run);
                        job.report(result.map_err(|e| e.to_string()))
                    }
                })
                .collect();
            let failed = results.iter().filter(|r| r.error.is_some()).count();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for r in &results {
                    match &r.error {
                        None => println!(
                            "{} → {} ({})",
                            r.source.display(),
                            r.dest.display(),
                            format_size(r.size)
                        ),
                        Some(e) => println!("{} ✗ {}", r.source.display(), e),
                    }
                }
                println!("{} processed, {} failed", results.len() - failed, failed);
            }
            if failed > 0 {
                return Err(format!("{failed} of {} images failed", results.len()).into());
            }
        }
        Command::GenConfig => unreachable!("handled before config is loaded"),
    }

    Ok(())
}

#[derive(Serialize)]
struct SizeReport {
    file: PathBuf,
    size: Option<Dimensions>,
}

#[derive(Serialize)]
struct BatchReport {
    source: PathBuf,
    dest: PathBuf,
    size: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn format_size(size: Option<Dimensions>) -> String {
    size.map(|d| d.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn report_written(
    magick: &Magick,
    dest: &Path,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let size = magick.image_size(dest)?;
    if json {
        let report = SizeReport {
            file: dest.to_path_buf(),
            size,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Wrote {} ({})", dest.display(), format_size(size));
    }
    Ok(())
}

/// One source image and the file it is written to.
#[derive(Debug, PartialEq)]
struct BatchJob {
    source: PathBuf,
    dest: PathBuf,
}

impl BatchJob {
    fn report(&self, result: Result<Option<Dimensions>, String>) -> BatchReport {
        let (size, error) = match result {
            Ok(size) => (size, None),
            Err(e) => {
                log::error!("{}: {}", self.source.display(), e);
                (None, Some(e))
            }
        };
        BatchReport {
            source: self.source.clone(),
            dest: self.dest.clone(),
            size,
            error,
        }
    }
}

fn shrink_job(
    magick: &Magick,
    job: &BatchJob,
    options: &ScaleOptions,
    dry_run: bool,
) -> Result<Option<Dimensions>, MagickError> {
    if dry_run {
        return magick
            .image_size(&job.source)?
            .map(|d| expected_dimensions(d, &shrink_options(options)))
            .transpose();
    }
    if let Some(parent) = job.dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dest = magick.shrink(&job.source, &job.dest, options)?;
    magick.image_size(&dest)
}

/// Expand inputs into jobs, in sorted order.
///
/// Images found under a directory input keep their path relative to that
/// directory; file inputs land directly in `out_dir`.
fn plan_batch(inputs: &[PathBuf], out_dir: &Path) -> Vec<BatchJob> {
    let mut jobs = Vec::new();
    for input in inputs {
        if input.is_dir() {
            jobs.extend(
                WalkDir::new(input)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && is_image(e.path()))
                    .map(|e| {
                        let dest = out_dir.join(e.path().strip_prefix(input).unwrap_or(e.path()));
                        BatchJob {
                            source: e.into_path(),
                            dest,
                        }
                    }),
            );
        } else {
            let name = input.file_name().unwrap_or(input.as_os_str());
            jobs.push(BatchJob {
                source: input.clone(),
                dest: out_dir.join(name),
            });
        }
    }
    jobs
}

/// Destinations claimed by more than one job.
fn shared_destinations(jobs: &[BatchJob]) -> HashSet<PathBuf> {
    let mut seen = HashSet::new();
    let mut shared = HashSet::new();
    for job in jobs {
        if !seen.insert(&job.dest) {
            shared.insert(job.dest.clone());
        }
    }
    shared
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn quality_outside_range_is_rejected() {
        for q in ["0", "101", "500"] {
            let parsed = Cli::try_parse_from([
                "magick-wrap", "resize", "in.jpg", "out.jpg", "--percent", "50", "--quality", q,
            ]);
            assert!(parsed.is_err(), "quality {q} accepted");
        }
    }

    #[test]
    fn quality_inside_range_is_accepted() {
        let cli = Cli::try_parse_from([
            "magick-wrap", "resize", "in.jpg", "out.jpg", "--percent", "50", "--quality", "85",
        ])
        .unwrap();
        match cli.command {
            Command::Resize(args) => assert_eq!(args.scale.to_options().quality.unwrap().value(), 85),
            _ => panic!("expected resize"),
        }
    }

    #[test]
    fn same_name_in_different_directories_keeps_both() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        touch(&input.join("a/x.jpg"));
        touch(&input.join("b/x.jpg"));
        touch(&input.join("b/notes.txt"));
        let out = tmp.path().join("out");

        let jobs = plan_batch(&[input.clone()], &out);
        assert_eq!(
            jobs,
            [
                BatchJob {
                    source: input.join("a/x.jpg"),
                    dest: out.join("a/x.jpg"),
                },
                BatchJob {
                    source: input.join("b/x.jpg"),
                    dest: out.join("b/x.jpg"),
                },
            ]
        );
        assert!(shared_destinations(&jobs).is_empty());
    }

    #[test]
    fn colliding_file_inputs_are_flagged() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a/x.jpg");
        let b = tmp.path().join("b/x.jpg");
        let c = tmp.path().join("b/y.png");
        for p in [&a, &b, &c] {
            touch(p);
        }
        let out = tmp.path().join("out");

        let jobs = plan_batch(&[a, b, c], &out);
        let shared = shared_destinations(&jobs);
        assert_eq!(shared, HashSet::from([out.join("x.jpg")]));

        let reports: Vec<BatchReport> = jobs
            .iter()
            .filter(|job| shared.contains(&job.dest))
            .map(|job| job.report(Err("shared".to_string())))
            .collect();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.error.is_some() && r.size.is_none()));
    }

    #[test]
    fn directory_and_file_input_can_collide() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("photos");
        touch(&dir.join("x.jpg"));
        let loose = tmp.path().join("elsewhere/x.jpg");
        touch(&loose);
        let out = tmp.path().join("out");

        let jobs = plan_batch(&[dir, loose], &out);
        assert_eq!(shared_destinations(&jobs), HashSet::from([out.join("x.jpg")]));
    }
}

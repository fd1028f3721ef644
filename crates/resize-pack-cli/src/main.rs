mod inputs;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use resize_pack_core::{
    CancellationToken, Execution, ProcessControl, Progress, ResizeRequest, ARCHIVE_FILENAME,
    MAX_BATCH_SIZE, MAX_DIMENSION, MIN_DIMENSION,
};
use sha2::{Digest, Sha256};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "resize-pack",
    version,
    about = "Resize a batch of images and bundle them into one zip archive"
)]
struct Cli {
    /// Image files, or directories whose images should be included
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Target width in pixels
    #[arg(long, default_value_t = 800, value_parser = dimension_parser())]
    width: u32,

    /// Target height in pixels
    #[arg(long, default_value_t = 600, value_parser = dimension_parser())]
    height: u32,

    /// Stretch every image to exactly WIDTHxHEIGHT instead of fitting inside it
    #[arg(long)]
    stretch: bool,

    /// Output archive
    #[arg(short, long, default_value = ARCHIVE_FILENAME)]
    output: PathBuf,

    /// Transcode with N worker threads (0 = one per CPU)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Also write the completion summary as JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Log every image as it is processed
    #[arg(short, long)]
    verbose: bool,
}

fn dimension_parser() -> clap::builder::RangedI64ValueParser<u32> {
    clap::value_parser!(u32).range(i64::from(MIN_DIMENSION)..=i64::from(MAX_DIMENSION))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let t_total = Instant::now();

    let paths = inputs::collect_paths(&cli.inputs)?;
    let admission = inputs::admit(paths);
    if !admission.rejected.is_empty() {
        warn!(
            limit = MAX_BATCH_SIZE,
            ignored = admission.rejected.len(),
            "too many images, only the first {} are processed",
            MAX_BATCH_SIZE
        );
    }
    let loaded = inputs::load_images(&admission.admitted)?;

    let request = ResizeRequest::new(cli.width, cli.height, !cli.stretch);
    let token = CancellationToken::new();
    {
        let token = token.clone();
        ctrlc::set_handler(move || token.cancel()).context("installing Ctrl-C handler")?;
    }
    let execution = match cli.jobs {
        Some(threads) => Execution::Parallel { threads },
        None => Execution::Sequential,
    };
    let control = ProcessControl::new()
        .with_execution(execution)
        .with_cancel_token(token);

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .context("progress bar template")?,
    );
    let result = resize_pack_core::process_with_control(
        &loaded.images,
        &request,
        &control,
        &|p: &Progress| {
            bar.set_position((p.ratio() * 100.0).round() as u64);
            if let Some(identifier) = &p.identifier {
                bar.set_message(identifier.clone());
            }
        },
    );
    bar.finish_and_clear();
    let result = result?;

    let summary = loaded.merge_summary(result.summary);

    fs::write(&cli.output, &result.archive)
        .with_context(|| format!("writing {}", cli.output.display()))?;

    if let Some(path) = &cli.summary_json {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &summary)?;
    }

    eprintln!(
        "Done! {} resized, {} failed, wrote {} ({} bytes, sha256 {}) ({:.2}s)",
        summary.succeeded,
        summary.failed,
        cli.output.display(),
        result.archive.len(),
        hex::encode(Sha256::digest(&result.archive)),
        t_total.elapsed().as_secs_f64()
    );
    if !summary.failed_identifiers.is_empty() {
        eprintln!("Failed: {}", summary.failed_identifiers.join(", "));
    }

    Ok(())
}

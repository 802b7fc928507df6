use std::{
    fs::File,
    io::{BufRead, BufReader, Write as _},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering},
    },
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use vidpress::{
    CompressConfig, FfmpegEngineFactory, FpsStats, InputFile, JobController, JobSnapshot,
    JobStatus,
};

#[derive(Parser, Debug)]
#[command(name = "vidpress", version)]
struct Cli {
    /// Emit debug diagnostics on stderr.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress a video with libx264 (requires `ffmpeg` on PATH).
    Compress(CompressArgs),
    /// Parse engine log lines and report the extracted fields and median fps.
    Telemetry(TelemetryArgs),
}

#[derive(Parser, Debug)]
struct CompressArgs {
    /// Input video.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Where to save the compressed MP4.
    #[arg(long)]
    out: Option<PathBuf>,

    /// ffmpeg program to run.
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Print the final job snapshot as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct TelemetryArgs {
    /// Log file to read; stdin when omitted.
    #[arg(long = "in")]
    in_path: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Compress(args) => cmd_compress(args),
        Command::Telemetry(args) => cmd_telemetry(args),
    }
}

/// Streams new log lines and progress changes to stderr as snapshots arrive.
#[derive(Default)]
struct ConsoleRenderer {
    job: AtomicU64,
    printed: AtomicUsize,
    progress: AtomicU8,
    out: Mutex<()>,
}

impl ConsoleRenderer {
    fn render(&self, snap: &JobSnapshot) {
        let _guard = self.out.lock().unwrap_or_else(|e| e.into_inner());

        if self.job.swap(snap.job_id, Ordering::SeqCst) != snap.job_id
            || snap.logs.len() < self.printed.load(Ordering::SeqCst)
        {
            self.printed.store(0, Ordering::SeqCst);
            self.progress.store(0, Ordering::SeqCst);
        }

        let mut stderr = std::io::stderr().lock();
        let start = self.printed.load(Ordering::SeqCst);
        for (i, entry) in snap.logs.iter().enumerate().skip(start) {
            let prefix = if entry.is_error() { "error: " } else { "" };
            let _ = writeln!(stderr, "{:>4}. {prefix}{}", i + 1, entry.message);
        }
        self.printed.store(snap.logs.len(), Ordering::SeqCst);

        if snap.is_running() && self.progress.swap(snap.progress, Ordering::SeqCst) != snap.progress {
            let _ = writeln!(stderr, "Progress: {}%", snap.progress);
        }
    }
}

fn format_median(median: Option<f64>) -> String {
    match median {
        Some(v) => format!("{v:.2} fps"),
        None => "n/a".to_string(),
    }
}

fn cmd_compress(args: CompressArgs) -> anyhow::Result<()> {
    let input = InputFile::open(&args.in_path)?;
    let controller = JobController::new(
        CompressConfig::default(),
        FfmpegEngineFactory::new(args.ffmpeg.clone()),
    )?;

    let renderer = Arc::new(ConsoleRenderer::default());
    controller.subscribe(move |snap: &JobSnapshot| renderer.render(snap));

    eprintln!("Selected Video: {}", input.name);
    controller.select_input(Some(input));
    let snap = controller.start();

    eprintln!("Median frames per second: {}", format_median(snap.median_fps));
    eprintln!("Progress: {}%", snap.progress);

    if let (Some(out), Some(video)) = (args.out.as_deref(), snap.output.as_ref()) {
        write_output(out, &video.bytes)?;
        eprintln!("wrote {} ({} bytes)", out.display(), video.len());
    }

    if args.json {
        let stdout = std::io::stdout().lock();
        serde_json::to_writer_pretty(stdout, &snap).context("write snapshot JSON")?;
        println!();
    }

    match snap.status {
        JobStatus::Succeeded => Ok(()),
        status => anyhow::bail!("compression ended as {status:?}"),
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write video '{}'", path.display()))
}

fn cmd_telemetry(args: TelemetryArgs) -> anyhow::Result<()> {
    let reader: Box<dyn BufRead> = match &args.in_path {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("open log '{}'", path.display()))?,
        )),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let mut stats = FpsStats::new();
    let mut stdout = std::io::stdout().lock();
    for line in reader.split(b'\n') {
        let line = line.context("read log line")?;
        let text = String::from_utf8_lossy(&line);
        // Progress lines are separated by carriage returns when ffmpeg writes to a pipe.
        for part in text.split('\r') {
            let fields = vidpress::parse_line(part);
            if fields.is_empty() {
                continue;
            }
            if let Some(fps) = fields.fps() {
                stats.record(fps);
            }
            serde_json::to_writer(&mut stdout, &fields).context("write fields JSON")?;
            writeln!(stdout)?;
        }
    }

    eprintln!("Median frames per second: {}", format_median(stats.median()));
    Ok(())
}

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use framegrab::{
    CaptureOptions, CaptureSession, FfmpegGraph, FfmpegLogLevel, MediaGraph, ProgressCallback,
    ProgressInfo, TimeFormat,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  framegrab info input.mp4 --json\n  framegrab frames input.mp4 --out frames --indices 1,25,50-60 --progress\n  framegrab frames input.mp4 --out frames --start 0:10 --end 0:12\n  framegrab audio input.mp4 --out clip.wav --start 60 --end 90\n  framegrab completions zsh > _framegrab";

#[derive(Debug, Parser)]
#[command(
    name = "framegrab",
    version,
    about = "Capture selected video frames and audio windows from media files",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional output.
    #[arg(long)]
    verbose: bool,

    /// Show a spinner while capturing.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,

    /// Completion poll interval in milliseconds.
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the streams a file would be captured from.
    #[command(
        about = "Print capturable streams",
        visible_alias = "probe",
        after_help = "Examples:\n  framegrab info input.mp4\n  framegrab info input.mp4 --json"
    )]
    Info {
        /// Input media path.
        input: PathBuf,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Capture video frames into an output directory.
    #[command(
        about = "Capture video frames",
        after_help = "Examples:\n  framegrab frames input.mp4 --out frames --indices 1,10,20-30\n  framegrab frames input.mp4 --out frames --start 00:00:10 --end 00:00:11 --ext jpg"
    )]
    Frames {
        /// Input media path.
        input: PathBuf,
        /// Output directory for frame images.
        #[arg(long)]
        out: PathBuf,
        /// Frame numbers to capture, starting at 1 (e.g. `1,5,10-20`).
        #[arg(long, conflicts_with_all = ["start", "end"])]
        indices: Option<String>,
        /// Window start (seconds or [hh:]mm:ss).
        #[arg(long, requires = "end")]
        start: Option<String>,
        /// Window end (seconds or [hh:]mm:ss).
        #[arg(long)]
        end: Option<String>,
        /// Video stream to save.
        #[arg(long, default_value_t = 0)]
        stream: usize,
        /// Output image extension (png, jpg, jpeg, bmp, tiff).
        #[arg(long, default_value = "png")]
        ext: String,
        /// Print a JSON summary instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Capture an audio window into a WAV file.
    #[command(
        about = "Capture audio to WAV",
        after_help = "Examples:\n  framegrab audio input.mp4 --out audio.wav\n  framegrab audio input.mp4 --out clip.wav --start 00:01:00 --end 00:01:30"
    )]
    Audio {
        /// Input media path.
        input: PathBuf,
        /// Output WAV path.
        #[arg(long)]
        out: PathBuf,
        /// Window start (seconds or [hh:]mm:ss).
        #[arg(long, requires = "end")]
        start: Option<String>,
        /// Window end (seconds or [hh:]mm:ss).
        #[arg(long)]
        end: Option<String>,
        /// Audio stream to save.
        #[arg(long, default_value_t = 0)]
        stream: usize,
        /// Print a JSON summary instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<f64, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(seconds.max(0.0));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [minutes, seconds] => (0, minutes.parse::<u64>()?, seconds.parse::<f64>()?),
        [hours, minutes, seconds] => (
            hours.parse::<u64>()?,
            minutes.parse::<u64>()?,
            seconds.parse::<f64>()?,
        ),
        _ => return Err(format!("invalid time format: {trimmed}").into()),
    };

    Ok((hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds).max(0.0))
}

/// Most frame numbers a single `--indices` list may expand to.
const MAX_FRAME_INDICES: u64 = 1_000_000;

/// Parse `1,5,10-12` into `[1, 5, 10, 11, 12]`.
fn parse_indices(value: &str) -> Result<Vec<u64>, Box<dyn std::error::Error>> {
    let mut indices = Vec::new();
    for part in value.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        match part.split_once('-') {
            Some((first, last)) => {
                let (first, last) = (first.trim().parse::<u64>()?, last.trim().parse::<u64>()?);
                if first > last {
                    return Err(format!("invalid frame range: {part}").into());
                }
                let room = MAX_FRAME_INDICES.saturating_sub(indices.len() as u64);
                if last - first >= room {
                    return Err(format!(
                        "frame list expands to more than {MAX_FRAME_INDICES} frames at {part}"
                    )
                    .into());
                }
                indices.extend(first..=last);
            }
            None => indices.push(part.parse::<u64>()?),
        }
    }
    if indices.is_empty() {
        return Err("no frame numbers given".into());
    }
    if indices.contains(&0) {
        return Err("frame numbers start at 1".into());
    }
    indices.sort_unstable();
    indices.dedup();
    Ok(indices)
}

fn parse_log_level(value: &str) -> Option<FfmpegLogLevel> {
    match value.to_ascii_lowercase().as_str() {
        "quiet" => Some(FfmpegLogLevel::Quiet),
        "panic" => Some(FfmpegLogLevel::Panic),
        "fatal" => Some(FfmpegLogLevel::Fatal),
        "error" => Some(FfmpegLogLevel::Error),
        "warning" | "warn" => Some(FfmpegLogLevel::Warning),
        "info" => Some(FfmpegLogLevel::Info),
        "verbose" => Some(FfmpegLogLevel::Verbose),
        "debug" => Some(FfmpegLogLevel::Debug),
        "trace" => Some(FfmpegLogLevel::Trace),
        _ => None,
    }
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn time_window(
    start: Option<String>,
    end: Option<String>,
) -> Result<Option<(f64, f64)>, Box<dyn std::error::Error>> {
    match (start, end) {
        (None, None) => Ok(None),
        (start, Some(end)) => {
            let start = start.as_deref().map(parse_timecode).transpose()?.unwrap_or(0.0);
            let end = parse_timecode(&end)?;
            if start >= end {
                return Err("--start must be before --end".into());
            }
            Ok(Some((start, end)))
        }
        (Some(_), None) => Err("--start requires --end".into()),
    }
}

struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner:.green} {elapsed} {msg}")?);
        Ok(Self { bar })
    }
}

impl ProgressCallback for SpinnerProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_message(format!(
            "{} delivered, {} captured",
            info.samples_delivered, info.samples_captured
        ));
        self.bar.tick();
    }
}

fn capture_options(
    global: &GlobalOptions,
) -> Result<(CaptureOptions, Option<ProgressBar>), Box<dyn std::error::Error>> {
    let mut options =
        CaptureOptions::new().with_poll_interval(Duration::from_millis(global.poll_ms));
    let mut bar = None;
    if global.progress {
        let spinner = SpinnerProgress::new()?;
        bar = Some(spinner.bar.clone());
        options = options.with_progress(Arc::new(spinner));
    }
    Ok((options, bar))
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if let Some(level) = &cli.global.log_level {
        let parsed = parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?;
        framegrab::set_ffmpeg_log_level(parsed);
    }

    match cli.command {
        Commands::Info { input, json } => {
            let session = CaptureSession::open(&input)?;
            let graph: &FfmpegGraph = session.graph();
            let duration_seconds = graph
                .duration(TimeFormat::MediaTime)
                .map(|time| time as f64 / 10_000_000.0);

            let mut video = Vec::new();
            for index in 0..session.video_engines().len() {
                video.push(session.video_info(index)?);
            }
            let mut audio = Vec::new();
            for index in 0..session.audio_engines().len() {
                audio.push(session.audio_info(index)?);
            }

            if json {
                let payload = json!({
                    "path": input.display().to_string(),
                    "duration_seconds": duration_seconds,
                    "frame_count": graph.duration(TimeFormat::Frame),
                    "video": video.iter().map(|info| json!({
                        "width": info.width,
                        "height": info.height,
                        "rate": info.rate,
                    })).collect::<Vec<_>>(),
                    "audio": audio.iter().map(|info| json!({
                        "channels": info.channels,
                        "rate": info.rate,
                        "bits": info.bits,
                    })).collect::<Vec<_>>(),
                    "sinks": session.splices().iter().map(|splice| json!({
                        "name": splice.sink_name,
                        "kind": splice.kind.to_string(),
                        "intercepted": splice.interceptor.is_some(),
                    })).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("File: {}", input.display());
                if let Some(seconds) = duration_seconds {
                    println!("Duration: {seconds:.3}s");
                }
                for (index, info) in video.iter().enumerate() {
                    println!(
                        "Video {index}: {}x{} @ {} fps",
                        info.width, info.height, info.rate
                    );
                }
                for (index, info) in audio.iter().enumerate() {
                    println!(
                        "Audio {index}: {} Hz, {} ch, {}-bit",
                        info.rate, info.channels, info.bits
                    );
                }
                if cli.global.verbose {
                    for splice in session.splices() {
                        let status = if splice.interceptor.is_some() {
                            "intercepted".green()
                        } else {
                            "discarded".yellow()
                        };
                        println!("  {} ({}) {status}", splice.sink_name, splice.kind);
                    }
                }
            }
        }
        Commands::Frames {
            input,
            out,
            indices,
            start,
            end,
            stream,
            ext,
            json,
        } => {
            let ext_clean = ext.trim_start_matches('.').to_ascii_lowercase();
            if !matches!(ext_clean.as_str(), "png" | "jpg" | "jpeg" | "bmp" | "tiff") {
                return Err(format!("unsupported --ext: {ext}").into());
            }
            if out.exists() && !cli.global.overwrite {
                return Err(format!(
                    "output directory already exists: {} (use --overwrite)",
                    out.display()
                )
                .into());
            }

            let mut session = CaptureSession::open(&input)?;
            if session.video_engines().is_empty() {
                return Err("no video stream".into());
            }
            session.disable_audio();
            if let Some(indices) = indices {
                session.set_frame_indices(&parse_indices(&indices)?)?;
            } else if let Some((start, end)) = time_window(start, end)? {
                session.set_time_window(start, end)?;
            }

            let (options, bar) = capture_options(&cli.global)?;
            session.run_with_options(&options)?;
            if let Some(bar) = bar {
                bar.finish_with_message("done");
            }

            fs::create_dir_all(&out)?;
            let info = session.video_info(stream)?;
            let mut written = Vec::with_capacity(info.frames_captured);
            for index in 0..info.frames_captured {
                let path = out.join(format!("frame_{index:06}.{ext_clean}"));
                ensure_writable_path(&path, cli.global.overwrite)?;
                session.save_video_frame(stream, index, &path)?;
                if cli.global.verbose {
                    eprintln!("{} {}", "wrote".green(), path.display());
                }
                written.push(path);
            }

            if json {
                let payload = json!({
                    "frames_captured": info.frames_captured,
                    "frames_total": info.frames_total,
                    "total_is_estimate": info.total_is_estimate,
                    "early_stop": session.early_stop_occurred(),
                    "files": written.iter().map(|path| path.display().to_string()).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "{} {} frames to {}",
                    "Captured".green().bold(),
                    info.frames_captured,
                    out.display()
                );
            }
        }
        Commands::Audio {
            input,
            out,
            start,
            end,
            stream,
            json,
        } => {
            ensure_writable_path(&out, cli.global.overwrite)?;

            let mut session = CaptureSession::open(&input)?;
            if session.audio_engines().is_empty() {
                return Err("no audio stream".into());
            }
            session.disable_video();
            if let Some((start, end)) = time_window(start, end)? {
                session.set_time_window(start, end)?;
            }

            let (options, bar) = capture_options(&cli.global)?;
            session.run_with_options(&options)?;
            if let Some(bar) = bar {
                bar.finish_with_message("done");
            }

            session.save_audio_wav(stream, &out)?;
            let info = session.audio_info(stream)?;
            let bytes: usize = session.audio_engines()[stream].captured_bytes();

            if json {
                let payload = json!({
                    "channels": info.channels,
                    "rate": info.rate,
                    "bits": info.bits,
                    "buffers": info.frames_captured,
                    "bytes": bytes,
                    "output": out.display().to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "{} {} bytes of audio to {}",
                    "Captured".green().bold(),
                    bytes,
                    out.display()
                );
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framegrab", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands, parse_indices, parse_log_level, parse_timecode, time_window};

    #[test]
    fn parse_timecode_formats() {
        assert_eq!(parse_timecode("75").unwrap(), 75.0);
        assert_eq!(parse_timecode("01:15").unwrap(), 75.0);
        assert_eq!(parse_timecode("00:01:15.5").unwrap(), 75.5);
        assert!(parse_timecode("").is_err());
        assert!(parse_timecode("1:2:3:4").is_err());
    }

    #[test]
    fn parse_indices_expands_ranges() {
        assert_eq!(parse_indices("1,5,10-12").unwrap(), vec![1, 5, 10, 11, 12]);
        assert_eq!(parse_indices("3, 1, 3").unwrap(), vec![1, 3]);
        assert!(parse_indices("0,1").is_err());
        assert!(parse_indices("5-2").is_err());
        assert!(parse_indices("").is_err());
    }

    #[test]
    fn parse_indices_rejects_huge_ranges() {
        assert!(parse_indices("1-10000000000").is_err());
        assert!(parse_indices("1-999999,2000000-2000001").is_err());
        assert_eq!(parse_indices("1-1000000").unwrap().len(), 1_000_000);
    }

    #[test]
    fn parse_log_level_aliases() {
        assert!(parse_log_level("warn").is_some());
        assert!(parse_log_level("QUIET").is_some());
        assert!(parse_log_level("loud").is_none());
    }

    #[test]
    fn time_window_requires_ordered_bounds() {
        assert_eq!(time_window(None, None).unwrap(), None);
        assert_eq!(
            time_window(None, Some("2".into())).unwrap(),
            Some((0.0, 2.0))
        );
        assert!(time_window(Some("3".into()), Some("2".into())).is_err());
    }

    #[test]
    fn frames_rejects_indices_with_window() {
        let parsed = Cli::try_parse_from([
            "framegrab", "frames", "in.mp4", "--out", "dir", "--indices", "1", "--start", "1",
            "--end", "2",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn frames_parses_indices() {
        let cli =
            Cli::try_parse_from(["framegrab", "frames", "in.mp4", "--out", "dir", "--indices", "1,2"])
                .unwrap();
        match cli.command {
            Commands::Frames { indices, ext, .. } => {
                assert_eq!(indices.as_deref(), Some("1,2"));
                assert_eq!(ext, "png");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

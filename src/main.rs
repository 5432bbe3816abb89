//! Command-line front end: load a media file, trim it and write the audio.

use std::io::Write;
use std::path::{Path, PathBuf};

use snipwave::config::{self, ExtractorConfig};
use snipwave::encode::{EncodeDispatcher, OutputFormat, QualityTier, StrategyPreference};
use snipwave::logging::{self, LoggingOptions};
use snipwave::progress::{EncodeResult, ProgressUpdate};
use snipwave::session::{PipelineError, Session};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Default, PartialEq)]
struct Options {
    input: PathBuf,
    start: Option<String>,
    end: Option<String>,
    format: Option<OutputFormat>,
    quality: Option<QualityTier>,
    strategy: Option<StrategyPreference>,
    ffmpeg: Option<PathBuf>,
    out: Option<PathBuf>,
    config: Option<PathBuf>,
    ack_capture: bool,
    json: bool,
    log_to_file: bool,
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    if let Err(err) = logging::init(&LoggingOptions {
        log_to_file: options.log_to_file,
        ..LoggingOptions::default()
    }) {
        eprintln!("Logging disabled: {err}");
    }

    let config = load_config(&options);
    let mut session = Session::from_config(&config);
    let (format, quality) = session.output();
    session.set_output(
        options.format.unwrap_or(format),
        options.quality.unwrap_or(quality),
    );

    match session.load_path(&options.input) {
        Ok(()) => {}
        Err(PipelineError::Decode(err)) => {
            eprintln!("Waveform unavailable: {err}");
        }
        Err(err) => return Err(err.status_message()),
    }
    apply_selection(&mut session, &options)?;

    let ffmpeg = options
        .ffmpeg
        .clone()
        .unwrap_or_else(|| config.engine.ffmpeg_path.clone());
    let mut dispatcher =
        EncodeDispatcher::native(config.dispatch_options(), config.host_profile(), ffmpeg);
    if let Some(strategy) = options.strategy {
        dispatcher.set_strategy(strategy);
    }
    tracing::debug!(strategy = ?dispatcher.options().strategy, "Dispatcher ready");

    let mut last_shown = -1i32;
    let mut on_progress = |update: ProgressUpdate| {
        let shown = update.percent.floor() as i32;
        if shown != last_shown {
            last_shown = shown;
            eprint!("\r{} {shown}%   ", update.phase.label());
            let _ = std::io::stderr().flush();
        }
    };
    let outcome = session.extract(&mut dispatcher, options.ack_capture, &mut on_progress);
    eprintln!();
    let result = outcome.map_err(|err| err.status_message())?;
    let path = output_path(options.out.as_deref(), result)?;
    std::fs::write(&path, &result.bytes)
        .map_err(|err| format!("Failed to write {}: {err}", path.display()))?;
    report(result, &path, options.json)
}

fn load_config(options: &Options) -> ExtractorConfig {
    let loaded = match options.config.as_deref() {
        Some(path) => config::load_from_path(path),
        None => config::load_or_default(),
    };
    loaded.unwrap_or_else(|err| {
        tracing::warn!("Using default settings: {err}");
        ExtractorConfig::default()
    })
}

fn apply_selection(session: &mut Session, options: &Options) -> Result<(), String> {
    if options.start.is_none() && options.end.is_none() {
        return Ok(());
    }
    if session.signal().is_none() {
        eprintln!("Selection ignored; the file could not be decoded for trimming");
        return Ok(());
    }
    let (current_start, current_end) = session.selection_model().timecodes();
    let start = options.start.clone().unwrap_or(current_start);
    let end = options.end.clone().unwrap_or(current_end);
    let outcome = session.edit_selection_text(&start, &end);
    if outcome.committed.is_some() {
        return Ok(());
    }
    let mut invalid = Vec::new();
    if !outcome.validity.start_valid {
        invalid.push(format!("--start {start}"));
    }
    if !outcome.validity.end_valid {
        invalid.push(format!("--end {end}"));
    }
    Err(format!("Invalid selection: {}", invalid.join(", ")))
}

fn output_path(out: Option<&Path>, result: &EncodeResult) -> Result<PathBuf, String> {
    match out {
        Some(path) if path.is_dir() => Ok(path.join(&result.suggested_filename)),
        Some(path) => Ok(path.to_path_buf()),
        None => {
            let dir = std::env::current_dir()
                .map_err(|err| format!("Failed to resolve current directory: {err}"))?;
            Ok(dir.join(&result.suggested_filename))
        }
    }
}

fn report(result: &EncodeResult, path: &Path, json: bool) -> Result<(), String> {
    for warning in &result.warnings {
        eprintln!("Warning: {warning}");
    }
    let descriptor = result.describe();
    if json {
        let text = serde_json::to_string_pretty(&descriptor)
            .map_err(|err| format!("Failed to serialize result: {err}"))?;
        println!("{text}");
    } else {
        println!(
            "Wrote {} ({}, {}, {:.2}s)",
            path.display(),
            descriptor.mime_type,
            descriptor.size_label,
            descriptor.achieved_duration_secs
        );
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", help_text());
        return Ok(None);
    }
    let mut options = Options {
        log_to_file: true,
        ..Options::default()
    };
    let mut input = None;
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| {
            it.next()
                .ok_or_else(|| format!("Missing value for {flag}"))
        };
        match arg.as_str() {
            "--start" => options.start = Some(value("--start")?),
            "--end" => options.end = Some(value("--end")?),
            "--format" => options.format = Some(value("--format")?.parse()?),
            "--quality" => options.quality = Some(value("--quality")?.parse()?),
            "--strategy" => options.strategy = Some(value("--strategy")?.parse()?),
            "--ffmpeg" => options.ffmpeg = Some(PathBuf::from(value("--ffmpeg")?)),
            "--out" => options.out = Some(PathBuf::from(value("--out")?)),
            "--config" => options.config = Some(PathBuf::from(value("--config")?)),
            "--ack-capture" => options.ack_capture = true,
            "--json" => options.json = true,
            "--no-log-file" => options.log_to_file = false,
            flag if flag.starts_with("--") => return Err(format!("Unknown argument: {flag}")),
            _ => {
                if input.is_some() {
                    return Err(format!("Unexpected extra input: {arg}"));
                }
                input = Some(PathBuf::from(&arg));
            }
        }
    }
    options.input = input.ok_or_else(|| format!("Missing input file\n\n{}", help_text()))?;
    Ok(Some(options))
}

fn help_text() -> String {
    [
        "Usage: snipwave <input> [options]",
        "",
        "Options:",
        "  --start <time>       Selection start (SS, MM:SS or H:MM:SS)",
        "  --end <time>         Selection end",
        "  --format <fmt>       mp3, wav, aac or flac",
        "  --quality <tier>     ultra-low, high, medium or low",
        "  --strategy <name>    local or external",
        "  --ffmpeg <path>      Transcoding engine binary",
        "  --out <path>         Output file or directory",
        "  --config <path>      Settings file (defaults to the app directory)",
        "  --ack-capture        Accept real-time capture for forced containers",
        "  --json               Print the result summary as JSON",
        "  --no-log-file        Log to stderr only",
    ]
    .join("\n")
}

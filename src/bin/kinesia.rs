//! Kinesia CLI - Command-line interface for the Kinesia engine
//!
//! Commands:
//! - replay: Run a recorded observation stream through a session (NDJSON)
//! - validate: Validate raw frame payloads against the wire schema
//! - doctor: Diagnose engine configuration and supported domains

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use kinesia::engine::AssessmentEngine;
use kinesia::schema::RawFrame;
use kinesia::types::AssessmentDomain;
use kinesia::{EngineConfig, EngineError, ENGINE_VERSION, PRODUCER_NAME, SCHEMA_VERSION};

/// Kinesia - On-device motion-assessment engine
#[derive(Parser)]
#[command(name = "kinesia")]
#[command(author = "Kinesia Labs")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Score recorded assessment observation streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recorded observation stream through one assessment session
    Replay {
        /// Assessment domain (e.g. GAIT_ANALYSIS, NECK_MOBILITY)
        #[arg(short, long)]
        domain: String,

        /// Input NDJSON file of raw frames (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for the assembled result JSON (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Engine configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// User identifier stamped on the result
        #[arg(long)]
        user: Option<String>,

        /// Advance manual phases after this many seconds in the phase
        #[arg(long, default_value = "6.0")]
        auto_advance_sec: f64,

        /// Print per-tick updates to stderr
        #[arg(long)]
        verbose: bool,
    },

    /// Validate raw frame payloads against the wire schema
    Validate {
        /// Input NDJSON file of raw frames (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Diagnose engine configuration and supported domains
    Doctor {
        /// Engine configuration JSON file to check
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Replay {
            domain,
            input,
            output,
            config,
            user,
            auto_advance_sec,
            verbose,
        } => cmd_replay(
            &domain,
            &input,
            &output,
            config.as_deref(),
            user,
            auto_advance_sec,
            verbose,
        ),
        Commands::Validate { input } => cmd_validate(&input),
        Commands::Doctor { config } => cmd_doctor(config.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_domain(name: &str) -> Result<AssessmentDomain, String> {
    serde_json::from_str(&format!("\"{}\"", name.to_uppercase()))
        .map_err(|_| format!("unknown assessment domain '{}'", name))
}

fn load_config(path: Option<&std::path::Path>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
            EngineConfig::from_json(&json).map_err(|e| e.to_string())
        }
        None => Ok(EngineConfig::default()),
    }
}

fn read_lines(input: &std::path::Path) -> Result<Vec<String>, String> {
    if input.as_os_str() == "-" {
        if atty::is(atty::Stream::Stdin) {
            eprintln!("reading NDJSON frames from stdin (pipe a recording, or press Ctrl-D)");
        }
        let stdin = io::stdin();
        stdin
            .lock()
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("stdin read failed: {}", e))
    } else {
        let content = fs::read_to_string(input)
            .map_err(|e| format!("cannot read {}: {}", input.display(), e))?;
        Ok(content.lines().map(|l| l.to_string()).collect())
    }
}

fn write_output(output: &std::path::Path, content: &str) -> Result<(), String> {
    if output.as_os_str() == "-" {
        let mut stdout = io::stdout();
        writeln!(stdout, "{}", content).map_err(|e| format!("stdout write failed: {}", e))
    } else {
        fs::write(output, content).map_err(|e| format!("cannot write {}: {}", output.display(), e))
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_replay(
    domain: &str,
    input: &std::path::Path,
    output: &std::path::Path,
    config: Option<&std::path::Path>,
    user: Option<String>,
    auto_advance_sec: f64,
    verbose: bool,
) -> Result<(), String> {
    let domain = parse_domain(domain)?;
    let config = load_config(config)?;
    let mut engine = match user {
        Some(user) => AssessmentEngine::with_user(domain, config, user),
        None => AssessmentEngine::new(domain, config),
    }
    .map_err(|e| e.to_string())?;

    let lines = read_lines(input)?;
    let mut frames = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let frame =
            RawFrame::from_json(line).map_err(|e| format!("line {}: {}", idx + 1, e))?;
        frames.push(frame);
    }
    if frames.is_empty() {
        return Err("no frames in input".to_string());
    }

    engine
        .start(frames[0].timestamp)
        .map_err(|e| e.to_string())?;

    let mut phase_index = 0usize;
    let mut phase_entered_at = frames[0].timestamp;
    let mut last_timestamp = frames[0].timestamp;

    for frame in &frames {
        last_timestamp = frame.timestamp;

        match engine.tick(frame) {
            Ok(update) => {
                if update.phase_index != phase_index {
                    phase_index = update.phase_index;
                    phase_entered_at = frame.timestamp;
                }
                if verbose {
                    eprintln!(
                        "{} phase={} window={} missing={}",
                        frame.timestamp.to_rfc3339(),
                        update.phase,
                        update.window_len,
                        update.missing_streak
                    );
                }
                if update.session_complete {
                    break;
                }
            }
            Err(EngineError::DetectionTimeout { attempts, elapsed_sec }) => {
                eprintln!(
                    "session aborted: no detection after {} attempts over {:.1}s",
                    attempts, elapsed_sec
                );
                break;
            }
            Err(e) if e.is_recoverable() => {
                eprintln!("recoverable: {}", e);
            }
            Err(e) => return Err(e.to_string()),
        }

        // Drive manual phases (e.g. neck positions) on a fixed cadence
        let in_phase = (frame.timestamp - phase_entered_at).num_milliseconds() as f64 / 1000.0;
        if engine.status() == kinesia::SessionStatus::Running
            && auto_advance_sec > 0.0
            && in_phase >= auto_advance_sec
        {
            if let Ok(update) = engine.advance_phase(frame.timestamp) {
                phase_index = update.phase_index;
                phase_entered_at = frame.timestamp;
                if update.session_complete {
                    break;
                }
            }
        }
    }

    let result = match engine.take_result() {
        Some(result) => result,
        None => engine.stop(last_timestamp).map_err(|e| e.to_string())?,
    };

    let json = serde_json::to_string_pretty(&result).map_err(|e| e.to_string())?;
    write_output(output, &json)?;

    eprintln!(
        "{}: {} samples, overall {:.1} ({:?}){}",
        result.kind.as_str(),
        result.data.len(),
        result.metrics.overall,
        result.metrics.band,
        if result.partial { " [partial]" } else { "" }
    );
    Ok(())
}

fn cmd_validate(input: &std::path::Path) -> Result<(), String> {
    let lines = read_lines(input)?;
    let mut frames = 0usize;
    let mut problems = 0usize;

    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match RawFrame::from_json(line) {
            Ok(frame) => {
                frames += 1;
                for problem in frame.validate() {
                    problems += 1;
                    eprintln!("line {}: {}", idx + 1, problem);
                }
            }
            Err(e) => {
                problems += 1;
                eprintln!("line {}: unparseable: {}", idx + 1, e);
            }
        }
    }

    println!(
        "{} frames checked against {}, {} problem(s)",
        frames, SCHEMA_VERSION, problems
    );
    if problems > 0 {
        return Err("validation failed".to_string());
    }
    Ok(())
}

fn cmd_doctor(config: Option<&std::path::Path>) -> Result<(), String> {
    println!("{} {}", PRODUCER_NAME, ENGINE_VERSION);
    println!("schema: {}", SCHEMA_VERSION);

    let config = load_config(config)?;
    println!("detection: {} attempts / {:.0}s", config.detection.max_attempts, config.detection.timeout_sec);

    println!("domains:");
    for &domain in AssessmentDomain::all() {
        let auto_stop = config
            .auto_stop(domain)
            .map(|sec| format!("{:.0}s auto-stop", sec))
            .unwrap_or_else(|| "explicit completion".to_string());
        println!(
            "  {:<16} window={} {}",
            domain.as_str(),
            config.window_capacity(domain),
            auto_stop
        );
    }
    Ok(())
}

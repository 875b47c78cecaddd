use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use ecovision_contracts::commands::{parse_command, SESSION_HELP_COMMANDS};
use ecovision_contracts::events::EventWriter;
use ecovision_contracts::history::{ClassificationResult, HistoryEvent, HistoryObserver};
use ecovision_contracts::waste::{ProbabilityDistribution, WasteCategory};
use ecovision_contracts::ScanError;
use ecovision_engine::capture::StillImageCamera;
use ecovision_engine::config::EngineConfig;
use ecovision_engine::session::{GateState, ScanOutcome, ScanSession, MIN_SUMMARY_ENTRIES};
use ecovision_engine::ClassificationEngine;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ecovision", version, about = "Point a camera at waste, get the right bin")]
struct Cli {
    /// Model name from the registry; falls back to the first capable model.
    #[arg(long, global = true)]
    model: Option<String>,
    /// Append session events to this JSONL file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify the item in one image.
    Classify(ImageArgs),
    /// Per-category probabilities for one image.
    Probe(ImageArgs),
    /// Summarize a list of categories, oldest first.
    Summarize(SummarizeArgs),
    /// Interactive scanning session.
    Session(SessionArgs),
}

#[derive(Debug, Parser)]
struct ImageArgs {
    #[arg(long)]
    image: PathBuf,
}

#[derive(Debug, Parser)]
struct SummarizeArgs {
    categories: Vec<String>,
}

#[derive(Debug, Parser)]
struct SessionArgs {
    /// Image file to use as the camera.
    #[arg(long)]
    camera: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("ecovision error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = EngineConfig::from_env();
    if let Some(model) = cli.model.clone() {
        config.model = Some(model);
    }
    let engine = ClassificationEngine::new(&config).context("failed to start engine")?;
    let mut session = ScanSession::new(&config, engine);
    if let Some(path) = cli.events.as_ref() {
        let events = EventWriter::new(path, uuid::Uuid::new_v4().to_string());
        session
            .attach_event_log(events)
            .with_context(|| format!("failed to write events to {}", path.display()))?;
    }
    if !cli.json {
        session.subscribe(NoticePrinter);
    }

    match cli.command {
        Command::Classify(args) => run_classify(&mut session, args, cli.json),
        Command::Probe(args) => run_probe(&mut session, args, cli.json),
        Command::Summarize(args) => run_summarize(&mut session, args, cli.json),
        Command::Session(args) => {
            run_session(&mut session, args)?;
            Ok(0)
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Prints the acknowledgement for each history change.
struct NoticePrinter;

impl HistoryObserver for NoticePrinter {
    fn notify(&self, event: &HistoryEvent) {
        let (title, body) = event.notice();
        match body {
            Some(body) => println!("{title} {body}"),
            None => println!("{title}"),
        }
    }
}

fn run_classify(session: &mut ScanSession, args: ImageArgs, json: bool) -> Result<i32> {
    if let Err(err) = session.use_camera(Box::new(StillImageCamera::new(&args.image))) {
        return Ok(report_failure(&err));
    }
    match session.scan() {
        Ok(ScanOutcome::Stored(result)) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", render_guidance(&result));
            }
            Ok(0)
        }
        Ok(ScanOutcome::Busy(state)) => {
            println!("{}", busy_message(state));
            Ok(1)
        }
        Err(err) => Ok(report_failure(&err)),
    }
}

fn run_probe(session: &mut ScanSession, args: ImageArgs, json: bool) -> Result<i32> {
    let outcome = session
        .use_camera(Box::new(StillImageCamera::new(&args.image)))
        .and_then(|()| session.probe());
    match outcome {
        Ok(distribution) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&distribution)?);
            } else {
                println!("{}", render_distribution(&distribution));
            }
            Ok(0)
        }
        Err(err) => Ok(report_failure(&err)),
    }
}

fn run_summarize(session: &mut ScanSession, args: SummarizeArgs, json: bool) -> Result<i32> {
    let labels = parse_categories(&args.categories)?;
    match session.engine_mut().summarize(&labels) {
        Ok(summary) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary.summary);
            }
            Ok(0)
        }
        Err(err) => Ok(report_failure(&err)),
    }
}

fn run_session(session: &mut ScanSession, args: SessionArgs) -> Result<()> {
    if let Some(path) = args.camera.as_ref() {
        match session.use_camera(Box::new(StillImageCamera::new(path))) {
            Ok(()) => println!("Camera on: {}", path.display()),
            Err(err) => {
                report_failure(&err);
            }
        }
    }

    let stdin = io::stdin();
    let mut line = String::new();
    println!("EcoVision session started. Type /help for commands.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let command = parse_command(line.trim_end_matches(['\n', '\r']));
        match command.action.as_str() {
            "noop" => {}
            "help" => println!("Commands: {}", SESSION_HELP_COMMANDS.join(" ")),
            "set_model" => match command.arg_str("model") {
                Some(model) => {
                    session.engine_mut().set_model(Some(model.to_string()));
                    println!("Model set to {model}");
                }
                None => println!(
                    "Model: {}",
                    session.engine().model().unwrap_or("(default)")
                ),
            },
            "camera_on" => match command.arg_str("path") {
                Some(path) => match session.use_camera(Box::new(StillImageCamera::new(path))) {
                    Ok(()) => println!("Camera on: {path}"),
                    Err(err) => {
                        report_failure(&err);
                    }
                },
                None => println!("/camera requires an image path"),
            },
            "camera_off" => {
                session.stop_camera();
                println!("Camera off");
            }
            "scan" => {
                if !switch_camera(session, command.arg_str("path")) {
                    continue;
                }
                match session.scan() {
                    Ok(ScanOutcome::Stored(result)) => println!("{}", render_guidance(&result)),
                    Ok(ScanOutcome::Busy(state)) => println!("{}", busy_message(state)),
                    Err(err) => {
                        report_failure(&err);
                    }
                }
            }
            "probe" => {
                if !switch_camera(session, command.arg_str("path")) {
                    continue;
                }
                match session.probe() {
                    Ok(distribution) => println!("{}", render_distribution(&distribution)),
                    Err(err) => {
                        report_failure(&err);
                    }
                }
            }
            "history" => println!("{}", render_history(session.history().snapshot())),
            "summary" => {
                if !session.summary_available() {
                    println!("Scan at least {MIN_SUMMARY_ENTRIES} items to get a summary.");
                    continue;
                }
                match session.summarize_history() {
                    Ok(summary) => println!("{}", summary.summary),
                    Err(err) => {
                        report_failure(&err);
                    }
                }
            }
            "clear" => session.clear_history(),
            "quit" => break,
            "unknown" => {
                let name = command.args.get("command").and_then(Value::as_str).unwrap_or("");
                println!("Unknown command: /{name}. Type /help for commands.");
            }
            other => println!("Unhandled action: {other}"),
        }
    }
    session.stop_camera();
    Ok(())
}

/// Points the camera at `path` when one is given. Returns false when that fails.
fn switch_camera(session: &mut ScanSession, path: Option<&str>) -> bool {
    let Some(path) = path else {
        return true;
    };
    match session.use_camera(Box::new(StillImageCamera::new(path))) {
        Ok(()) => true,
        Err(err) => {
            report_failure(&err);
            false
        }
    }
}

fn report_failure(err: &ScanError) -> i32 {
    tracing::debug!(kind = err.kind(), error = %err, "scan failed");
    println!("{}", err.user_message());
    eprintln!("  ({err})");
    1
}

fn busy_message(state: GateState) -> String {
    match state {
        GateState::CoolingDown(remaining) => format!(
            "Please wait {:.1}s before the next scan.",
            remaining.as_secs_f64()
        ),
        GateState::InFlight | GateState::Ready => "A scan is already in progress.".to_string(),
    }
}

fn parse_categories(raw: &[String]) -> Result<Vec<String>> {
    raw.iter()
        .map(|label| {
            label
                .parse::<WasteCategory>()
                .map(|category| category.as_str().to_string())
                .with_context(|| {
                    format!(
                        "unknown category '{label}'; expected Biodegradable, Recyclable or \"Domestic Hazardous\""
                    )
                })
        })
        .collect()
}

fn render_guidance(result: &ClassificationResult) -> String {
    let mut lines = vec![result.category.disposal_guidance().to_string()];
    if let Some(tips) = result.recycling_tips.as_deref() {
        lines.push(format!("Tips: {tips}"));
    }
    lines.join("\n")
}

fn render_distribution(distribution: &ProbabilityDistribution) -> String {
    let leading = distribution.most_likely();
    let mut lines: Vec<String> = WasteCategory::ALL
        .iter()
        .map(|category| {
            let marker = if *category == leading { "*" } else { " " };
            format!(
                "{marker} {:<20} {:>5.1}%",
                category.as_str(),
                distribution.get(*category) * 100.0
            )
        })
        .collect();
    if !distribution.is_normalized(0.05) {
        lines.push(format!(
            "  (scores sum to {:.2}, not 1.0)",
            distribution.total()
        ));
    }
    lines.join("\n")
}

fn render_history(entries: &[ClassificationResult]) -> String {
    if entries.is_empty() {
        return "No items scanned yet.".to_string();
    }
    entries
        .iter()
        .map(|entry| {
            let when = DateTime::<Utc>::from_timestamp_millis(entry.timestamp)
                .map(|time| time.with_timezone(&Local).format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "--:--:--".to_string());
            format!("{when}  {}", entry.label())
        })
        .collect::<Vec<String>>()
        .join("\n")
}

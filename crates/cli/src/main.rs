//! CLI for the interlock engine.
//!
//! Pipeline: load scenario -> build collaborators -> start sweeper -> run
//! steps -> report.

mod script;

use clap::{Parser, Subcommand};
use interlock_core::EngineConfig;
use interlock_engine::reporter::Report;
use interlock_engine::sink::json_stream::{JsonStreamSink, NdjsonAuditSink};
use interlock_engine::InterlockEngine;
use interlock_provider::{AuditSink, TracingAuditSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::script::Scenario;

#[derive(Parser, Debug)]
#[command(name = "interlock", version, about = "Device interlock engine runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario file against a fresh engine.
    Run {
        #[arg(short, long)]
        scenario: PathBuf,

        /// JSON engine config; overrides the scenario's own `config`.
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long, env = "INTERLOCK_SWEEP_INTERVAL_MS")]
        sweep_interval_ms: Option<u64>,

        #[arg(long, env = "INTERLOCK_DEFAULT_PRIORITY")]
        default_priority: Option<i32>,

        #[arg(long, env = "INTERLOCK_SYSTEM_ACTOR")]
        system_actor: Option<String>,

        /// Print step results as JSON instead of the text report.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Sink output: "ndjson" writes NDJSON to stdout,
        /// "ndjson:/path/to/file" writes to file.
        #[arg(long)]
        sink: Option<String>,

        /// Append audit events as NDJSON to this file instead of the log.
        #[arg(long)]
        audit_log: Option<PathBuf>,

        /// Do not start the background expiry sweeper.
        #[arg(long, default_value_t = false)]
        no_sweeper: bool,
    },

    /// Parse a scenario and validate its rules and config.
    Validate {
        #[arg(short, long)]
        scenario: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            config,
            sweep_interval_ms,
            default_priority,
            system_actor,
            json,
            sink,
            audit_log,
            no_sweeper,
        } => {
            let t0 = Instant::now();
            let scenario_path = scenario;
            let scenario = Scenario::load(&scenario_path)?;

            // 1. Resolve config: file, then scenario, then flags/env.
            let mut engine_config = match config {
                Some(path) => EngineConfig::from_file(path)?,
                None => scenario.config.clone().unwrap_or_default(),
            };
            if let Some(ms) = sweep_interval_ms {
                engine_config.sweep_interval_ms = ms;
            }
            if let Some(priority) = default_priority {
                engine_config.default_priority = priority;
            }
            if let Some(actor) = system_actor {
                engine_config.system_actor = actor;
            }

            // 2. Collaborators.
            let audit: Arc<dyn AuditSink> = match &audit_log {
                Some(path) => Arc::new(NdjsonAuditSink::new(
                    std::fs::OpenOptions::new().create(true).append(true).open(path)?,
                )),
                None => Arc::new(TracingAuditSink),
            };
            let engine = InterlockEngine::new(
                engine_config,
                Arc::new(scenario.fixture.rule_store()?),
                Arc::new(scenario.fixture.topology()),
                audit,
            )?;
            tracing::info!(
                scenario = %scenario_path.display(),
                steps = scenario.steps.len(),
                rules = scenario.fixture.rules.len(),
                areas = scenario.fixture.areas.len(),
                "starting scenario"
            );

            // 3. Run.
            let sweeper = (!no_sweeper).then(|| engine.spawn_sweeper());
            let records = script::run_steps(&engine, &scenario.steps).await;
            if let Some(handle) = sweeper {
                handle.shutdown().await?;
            }

            let failed = records.iter().filter(|r| !r.ok).count();
            tracing::info!(
                steps = records.len(),
                failed,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "scenario complete"
            );

            // 4. Report and sink output.
            let report = Report::build(&engine, t0.elapsed());

            if let Some(ref sink_spec) = sink {
                let (summary, locks) = report.to_rows();

                if sink_spec == "ndjson" {
                    let mut s = JsonStreamSink::stdout();
                    s.write_statistics(&summary)?;
                    s.write_locks(&locks)?;
                    let n = s.finish()?;
                    tracing::info!(rows = n, "ndjson sink: wrote to stdout");
                } else if let Some(path) = sink_spec.strip_prefix("ndjson:") {
                    let file = std::fs::File::create(path)?;
                    let mut s = JsonStreamSink::new(file);
                    s.write_statistics(&summary)?;
                    s.write_locks(&locks)?;
                    let n = s.finish()?;
                    tracing::info!(rows = n, path, "ndjson sink: wrote to file");
                } else {
                    eprintln!("Unknown sink: {sink_spec}. Use 'ndjson' or 'ndjson:/path'");
                }

                eprint!("{}", report.render());
            } else if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    let mark = if record.ok { "ok " } else { "ERR" };
                    println!("[{mark}] #{:<3} {:<13} {}", record.step, record.op, record.result);
                }
                print!("{}", report.render());
            }
        }

        Commands::Validate { scenario } => {
            let parsed = Scenario::load(&scenario)?;
            if let Some(config) = &parsed.config {
                config.validate()?;
            }
            let store = parsed.fixture.rule_store()?;
            println!(
                "{}: {} rules, {} areas, {} steps",
                scenario.display(),
                store.len(),
                parsed.fixture.areas.len(),
                parsed.steps.len()
            );
        }
    }

    Ok(())
}

//! nanny-diag - command-line front end for the diagnostic engine
//!
//! Sessions live as JSON files under `<data-dir>/sessions`, agents in
//! `<data-dir>/agents.json`. The oracle is configured from the environment
//! (`DEEPSEEK_API_KEY`, `NANNY_ORACLE_*`).

use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use nanny_diagnostics::agents::{AgentInfo, AgentRegistry, AgentValidator};
use nanny_diagnostics::config::DiagnosticConfig;
use nanny_diagnostics::oracle::ChatCompletionsClient;
use nanny_diagnostics::store::FileSessionStore;
use nanny_diagnostics::telemetry;
use nanny_diagnostics::{metrics, DiagnosticEngine, SessionUpdate};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "nanny-diag")]
#[command(about = "Drive LLM-assisted diagnostic sessions for monitored Linux hosts", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding sessions/ and agents.json (default: ~/.nanny)
    #[arg(long, env = "NANNY_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Print Prometheus metrics to stderr after the command
    #[arg(long, global = true)]
    dump_metrics: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// OTLP collector endpoint for span export
    #[arg(long, env = "NANNY_OTLP_ENDPOINT", global = true)]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a monitored host agent
    RegisterAgent {
        #[arg(long)]
        user: String,
        #[arg(long)]
        hostname: String,
        #[arg(long, default_value = "")]
        ip_address: String,
        #[arg(long, default_value = "")]
        kernel_version: String,
        #[arg(long, default_value = "")]
        os_version: String,
    },

    /// List agents owned by a user
    Agents {
        #[arg(long)]
        user: String,
    },

    /// Start a diagnostic session
    Start {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        issue: String,
        /// Extra system facts, KEY=VALUE (repeatable)
        #[arg(long = "info", value_parser = parse_key_val)]
        info: Vec<(String, String)>,
    },

    /// Feed command output into the next round (reads stdin if no --result)
    Continue {
        session_id: String,
        #[arg(long = "result")]
        results: Vec<String>,
    },

    /// Show a session as JSON
    Get { session_id: String },

    /// Show a human-readable session summary
    Summary { session_id: String },

    /// Delete a session
    Delete {
        session_id: String,
        #[arg(long)]
        user: String,
    },

    /// List sessions owned by a user
    List {
        #[arg(long)]
        user: String,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn default_data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".nanny")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = telemetry::init_tracing("nanny-diag", cli.otlp_endpoint.as_deref(), cli.json_logs) {
        eprintln!("warning: tracing disabled: {}", e);
    }

    let code = match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    };

    if cli.dump_metrics {
        eprint!("{}", metrics::render());
    }
    if cli.otlp_endpoint.is_some() {
        telemetry::shutdown_tracing();
    }
    code
}

async fn run(cli: &Cli) -> Result<ExitCode, BoxError> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let registry = Arc::new(AgentRegistry::open(data_dir.join("agents.json"))?);

    match &cli.command {
        Commands::RegisterAgent {
            user,
            hostname,
            ip_address,
            kernel_version,
            os_version,
        } => {
            let mut agent = AgentInfo::new(user.clone(), hostname.clone());
            agent.ip_address = ip_address.clone();
            agent.kernel_version = kernel_version.clone();
            agent.os_version = os_version.clone();
            registry.register(agent.clone()).await?;
            print_json(&agent)?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Agents { user } => {
            print_json(&registry.agents_for_user(user).await)?;
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let config = DiagnosticConfig::from_env()?;
    let store = Arc::new(FileSessionStore::new(data_dir.join("sessions"))?);
    let oracle = Arc::new(ChatCompletionsClient::new(config.oracle.clone()));
    let engine = DiagnosticEngine::new(store, registry.clone(), oracle, &config);

    match &cli.command {
        Commands::Start {
            agent,
            user,
            issue,
            info,
        } => {
            // Reported host facts first, command-line overrides on top
            let mut system_info: HashMap<String, String> = match registry.find_agent(agent).await? {
                Some(record) => record.system_info(),
                None => HashMap::new(),
            };
            system_info.extend(info.iter().cloned());

            let update = engine.start_session(agent, user, issue, system_info).await?;
            report_update(update)
        }
        Commands::Continue {
            session_id,
            results,
        } => {
            let results = if results.is_empty() {
                read_stdin_lines()?
            } else {
                results.clone()
            };
            let update = engine.continue_session(session_id, results).await?;
            report_update(update)
        }
        Commands::Get { session_id } => {
            print_json(&engine.get_session(session_id).await?)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Summary { session_id } => {
            print!("{}", engine.get_summary(session_id).await?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Delete { session_id, user } => {
            engine.delete_session(session_id, user).await?;
            println!("deleted {}", session_id);
            Ok(ExitCode::SUCCESS)
        }
        Commands::List { user } => {
            print_json(&engine.list_sessions(user).await?)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::RegisterAgent { .. } | Commands::Agents { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// Print the session; an absorbed oracle failure goes to stderr and makes
/// the exit status non-zero
fn report_update(update: SessionUpdate) -> Result<ExitCode, BoxError> {
    print_json(&update.session)?;
    if !update.oracle_consulted {
        eprintln!("note: iteration budget exhausted, session is {}", update.session.status);
    }
    match update.oracle_error {
        Some(e) => {
            eprintln!("oracle error (session still advanced): {}", e);
            Ok(ExitCode::from(2))
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_stdin_lines() -> Result<Vec<String>, BoxError> {
    let stdin = std::io::stdin();
    let mut lines = Vec::new();
    for line in stdin.lock().lines() {
        lines.push(line?);
    }
    Ok(lines)
}

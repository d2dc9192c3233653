mod commands;
mod persist;

use crate::commands::{CliContext, CliHelper};
use crate::persist::{CliPersistence, SqliteTokenStore};
use anyhow::anyhow;
use anyhow::Result;
use clap::Parser;
use commands::CommandResult;
use commands::{execute_command, Commands};
use log::{error, info};
use rustyline::error::ReadlineError;
use rustyline::hint::HistoryHinter;
use rustyline::Editor;
use std::{fs, path::PathBuf};
use token_gateway::models::{Config, Credentials};
use token_gateway::{EventListener, GatewayBuilder, GatewayClient, GatewayEvent};

#[derive(Parser)]
#[command(version, about = "CLI client for the token gateway module", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the data directory
    #[arg(short, long, default_value = "./.data")]
    data_dir: String,

    /// Processor API username
    #[arg(long, env = "TOKEN_GATEWAY_API_USERNAME", default_value = "")]
    api_username: String,

    /// Processor API password
    #[arg(long, env = "TOKEN_GATEWAY_API_PASSWORD", default_value = "", hide_env_values = true)]
    api_password: String,

    /// Send requests to the sandbox endpoint
    #[arg(long, env = "TOKEN_GATEWAY_TEST_MODE")]
    test_mode: bool,

    /// Override the live processor URL
    #[arg(long, env = "TOKEN_GATEWAY_LIVE_URL")]
    live_url: Option<String>,

    /// Override the sandbox processor URL
    #[arg(long, env = "TOKEN_GATEWAY_SANDBOX_URL")]
    sandbox_url: Option<String>,
}

fn expand_path(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(stripped) => Ok(dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not find home directory"))?
            .join(stripped)),
        None => Ok(PathBuf::from(path)),
    }
}

/// Parse a command string into a Commands enum using clap
fn parse_command(input: &str) -> Result<Commands> {
    // Handle exit command specially since it's not exposed in non-interactive mode
    if input.trim() == "exit" || input.trim() == "quit" {
        return Ok(Commands::Exit {});
    }

    // Create args for clap by adding program name at the beginning
    let mut args = vec!["token-gateway-cli".to_string()];
    args.extend(shlex::split(input).ok_or_else(|| anyhow!("Failed to parse command"))?);

    let cmd = Commands::try_parse_from(&args)?;
    Ok(cmd)
}

struct CliEventListener {}

impl EventListener for CliEventListener {
    fn on_event(&self, event: &GatewayEvent) {
        info!("Event received: {:?}", event);
    }
}

async fn run_interactive_mode(
    data_dir: PathBuf,
    gateway: GatewayClient,
    credentials: Credentials,
) -> Result<()> {
    let persistence = CliPersistence {
        data_dir: data_dir.clone(),
    };
    let store = SqliteTokenStore::new(&persistence.database_file())?;

    // Register event listener
    let _listener_id = gateway.add_event_listener(Box::new(CliEventListener {}));

    let ctx = CliContext {
        gateway,
        store,
        credentials,
    };

    // Initialize rustyline
    let helper = CliHelper {
        hinter: HistoryHinter {},
    };
    let mut rl = Editor::new()?;
    rl.set_helper(Some(helper));

    // Load history from file
    let history_file = persistence.history_file();
    if rl.load_history(&history_file).is_err() {
        error!("Failed to load history");
    }

    println!("Welcome to the token gateway CLI!");
    println!("Type 'help' to see available commands or 'exit' to quit.");

    loop {
        let readline = rl.readline("gateway> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match parse_command(line) {
                    Ok(cmd) => {
                        if let Commands::Exit {} = cmd {
                            break;
                        }

                        let res = execute_command(cmd, &ctx).await;
                        show_results(res)?;
                    }
                    Err(e) => println!("Error parsing command: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Err(err) = rl.save_history(&history_file) {
        error!("Failed to save history: {}", err);
    }

    Ok(())
}

fn show_results(result: Result<String>) -> Result<()> {
    let result_str = match result {
        Ok(r) => r,
        Err(err) => serde_json::to_string_pretty(&CommandResult {
            success: false,
            message: err.to_string(),
        })?,
    };

    println!("{result_str}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let data_dir = expand_path(&cli.data_dir)?;
    fs::create_dir_all(&data_dir)?;

    // Initialize logging
    GatewayClient::init_logging(&data_dir.to_string_lossy(), None)?;

    let mut config = Config::default_config();
    if let Some(live_url) = cli.live_url {
        config.live_url = live_url;
    }
    if let Some(sandbox_url) = cli.sandbox_url {
        config.sandbox_url = sandbox_url;
    }
    let gateway = GatewayBuilder::new(config).build()?;
    let credentials = Credentials::new(cli.api_username, cli.api_password, cli.test_mode);

    run_interactive_mode(data_dir, gateway, credentials).await
}

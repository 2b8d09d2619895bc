use clap::{Parser, Subcommand};
use stackcord::bridge::Bridge;
use stackcord::channels::{ConsoleTransport, InboundMessage, Network};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "stackcord")]
#[command(about = "Stack chat / Discord bridge and command bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config.json.
    Init {
        /// Config file path (default: STACKCORD_CONFIG_PATH or ~/.stackcord/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the bridge: HTTP gateway, Stack sidecar transport and (when built with it) Discord.
    Run {
        /// Config file path (default: STACKCORD_CONFIG_PATH or ~/.stackcord/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// List the commands a reload would load.
    Commands {
        /// Config file path (default: STACKCORD_CONFIG_PATH or ~/.stackcord/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Route one message as if it were posted in a Stack room; output is printed.
    Simulate {
        /// Config file path (default: STACKCORD_CONFIG_PATH or ~/.stackcord/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Stack room id the message is posted in.
        #[arg(long, value_name = "ID")]
        room: String,

        /// Message text, e.g. `!bot echo hello`.
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("stackcord {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, port }) => {
            if let Err(e) = run_bridge(config, port).await {
                log::error!("bridge failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Commands { config }) => {
            if let Err(e) = list_commands(config).await {
                log::error!("listing commands failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Simulate { config, room, text }) => {
            if let Err(e) = simulate(config, room, text.join(" ")).await {
                log::error!("simulate failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(stackcord::config::default_config_path);
    let dir = stackcord::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_bridge(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = stackcord::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting stackcord with {} on {}:{}",
        path.display(),
        config.gateway.bind,
        config.gateway.port
    );
    stackcord::gateway::run_gateway(config).await
}

async fn console_bridge(config_path: Option<PathBuf>) -> anyhow::Result<Arc<Bridge>> {
    let (mut config, _) = stackcord::config::load_config(config_path)?;
    config.stack.send_interval_ms = 0;
    Bridge::from_config(&config, Arc::new(ConsoleTransport::new(Network::StackExchange))).await
}

async fn list_commands(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let bridge = console_bridge(config_path).await?;
    for d in bridge.registry().descriptors().await {
        if d.description.is_empty() {
            println!("{}", d.name);
        } else {
            println!("{:<12} {}", d.name, d.description);
        }
    }
    Ok(())
}

async fn simulate(config_path: Option<PathBuf>, room: String, text: String) -> anyhow::Result<()> {
    let bridge = console_bridge(config_path).await?;
    let message = InboundMessage::stack(room, "0", "console", text, 1);
    let outcome = bridge.handle(message).await;
    log::info!("handled as {:?}", outcome);
    Ok(())
}

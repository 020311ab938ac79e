use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "promptrelay")]
#[command(about = "Promptrelay - webhook dispatch for generative-model commands", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the gateway and worker (webhook ingress + async model dispatch).
    Serve {
        /// Config file path (default: PROMPTRELAY_CONFIG_PATH or ~/.promptrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 8787)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// List configured command routes.
    Routes {
        /// Config file path (default: PROMPTRELAY_CONFIG_PATH or ~/.promptrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("promptrelay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Routes { config }) => {
            if let Err(e) = run_routes(config) {
                log::error!("routes failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, _path) = promptrelay::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    let secrets = promptrelay::secrets::provider_from_config(&config);
    log::info!(
        "starting gateway on {}:{} (stage: {})",
        config.gateway.bind,
        config.gateway.port,
        config.stage
    );
    promptrelay::gateway::run_gateway(config, secrets).await
}

fn run_routes(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, path) = promptrelay::config::load_config(config_path)?;
    if config.routes.is_empty() {
        println!("no routes configured in {}", path.display());
        return Ok(());
    }
    let mut commands: Vec<_> = config.routes.iter().collect();
    commands.sort_by_key(|(c, _)| c.as_str());
    for (command, route) in commands {
        println!(
            "/webhook/{}  {}  {}",
            command,
            serde_json::to_string(&route.kind)?.trim_matches('"'),
            route.model_id
        );
    }
    Ok(())
}

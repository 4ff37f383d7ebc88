use clap::{Parser, Subcommand};
use genesis_core::Config;
use genesis_server::run_server;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "genesis")]
#[command(about = "Genesis file mirror with peer digest consensus")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Server {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Load and validate a configuration file, then exit
    CheckConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genesis=info,genesis_server=info,genesis_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server { config } => {
            tracing::info!("Starting Genesis mirror with config: {}", config);

            let cfg = match Config::from_file(&config) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("Failed to load config: {}", e);
                    std::process::exit(1);
                }
            };

            tracing::info!(
                "Server name: {}, Bind: {}, Categories: {}, Digest: {:?}",
                cfg.server_name,
                cfg.bind_addr,
                cfg.categories.len(),
                cfg.consensus.digest
            );

            run_server(cfg).await?;
        }
        Commands::CheckConfig { config } => {
            let cfg = Config::from_file(&config)
                .map_err(|e| anyhow::anyhow!("invalid config {}: {}", config, e))?;

            println!("server_name: {}", cfg.server_name);
            println!("bind_addr:   {}", cfg.bind_addr);
            println!("digest:      {:?}", cfg.consensus.digest);
            for category in &cfg.categories {
                let kinds: Vec<&str> = category.kinds().map(|kind| kind.as_str()).collect();
                println!(
                    "category {}: {} peers, dynamic [{}], {} static files",
                    category.name,
                    category.peers.len(),
                    kinds.join(", "),
                    category.static_files.len()
                );
            }
        }
    }

    Ok(())
}

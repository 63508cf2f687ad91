use anyhow::{Context, Result};
use canvass::{advocacy, chat, web_server, AnalystProfile, ApiArgs, Settings};
use clap::Parser;
use std::{net::IpAddr, net::SocketAddr, path::PathBuf, time::Duration};
use tracing::{error, info};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    api: ApiArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the advocacy and analyst tools as a web UI.
    Serve {
        #[arg(long, default_value = "127.0.0.1", help = "Address to bind.")]
        host: IpAddr,
        #[arg(long, default_value_t = canvass::constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = "templates", help = "Directory holding the page templates.")]
        templates: PathBuf,
        #[arg(long, default_value = "static", help = "Directory served under /static.")]
        static_dir: PathBuf,
        #[arg(
            long,
            env = "CANVASS_IDLE_TIMEOUT",
            default_value_t = canvass::constants::DEFAULT_WORKSPACE_IDLE_SECS,
            help = "Seconds an unused analyst workspace is kept."
        )]
        idle_timeout: u64,
    },
    /// Generate an advocacy message for a campaign page.
    Compose {
        #[arg(long, help = "Advocacy campaign page URL.")]
        url: String,
        #[arg(long, help = "Your name.")]
        name: String,
        #[arg(long, help = "Your city or constituency.")]
        constituency: String,
    },
    /// Chat with an analyst about a CSV file in the terminal.
    Chat {
        #[arg(long, value_enum, default_value_t = AnalystProfile::Donations)]
        profile: AnalystProfile,
        /// CSV file to analyze.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for GOOGLE_API_KEY and friends)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g., RUST_LOG=info,canvass=debug); logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("canvass starting with command: {:?}", cli.command);
    let settings = Settings::from(cli.api);

    match cli.command {
        Commands::Serve {
            host,
            port,
            templates,
            static_dir,
            idle_timeout,
        } => {
            if settings.api_key.is_none() {
                info!("No GOOGLE_API_KEY configured; only interactive keys will work");
            }
            let state = web_server::AppState::new(settings, &templates)
                .context("Failed to initialize web server state")?
                .with_idle_timeout(Duration::from_secs(idle_timeout));
            let addr = SocketAddr::new(host, port);

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(addr, state, static_dir).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, shutting down...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Compose {
            url,
            name,
            constituency,
        } => {
            let api_key = settings
                .api_key
                .clone()
                .context("No API key available. Pass --api-key or set GOOGLE_API_KEY.")?;
            let fetcher = settings
                .fetcher()
                .context("Failed to build campaign page client")?;
            let client = settings.gemini_client(api_key);
            let request = advocacy::AdvocacyRequest {
                url,
                constituent_name: name,
                constituency,
            };

            let outcome = advocacy::run(&fetcher, &client, settings.summarize, &request).await;
            if let Some(summary) = outcome.summary() {
                println!("## Campaign Summary\n\n{}\n", summary);
            }
            if let Some(message) = outcome.message() {
                println!("## Your Advocacy Message\n\n{}", message);
            }
            if let Some(err) = outcome.error() {
                anyhow::bail!(err);
            }
        }
        Commands::Chat { profile, file } => {
            chat::run_terminal_chat(&settings, profile, &file)
                .await
                .context("Chat session failed")?;
        }
    }

    Ok(())
}

//! wiregate - gateway client
//!
//! Connects to the real-time gateway and logs every event it receives.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wiregate::proto::{EventKind, GatewayEvent, Intents};
use wiregate::{
    EndpointProvider, FnResponder, GatewayClient, GatewayConfig, RestEndpoint, StaticEndpoint,
};

#[derive(Parser)]
#[command(name = "wiregate")]
#[command(about = "Real-time gateway client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the gateway and log received events
    Run {
        /// Path to config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Bot token (overrides the config file)
        #[arg(long, env = "WIREGATE_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Intents, as comma-separated names or raw bits
        #[arg(long)]
        intents: Option<Intents>,

        /// Connect to this socket URL instead of looking it up
        #[arg(long)]
        gateway_url: Option<String>,

        /// REST API base used for the endpoint lookup
        #[arg(long)]
        api_base: Option<String>,
    },

    /// Generate a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "wiregate.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("wiregate=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            token,
            intents,
            gateway_url,
            api_base,
        } => {
            let mut gateway_config = match config {
                Some(path) => GatewayConfig::read_file(&path)?,
                None => GatewayConfig::default(),
            };
            if let Some(token) = token {
                gateway_config = gateway_config.with_token(token);
            }
            if let Some(intents) = intents {
                gateway_config = gateway_config.with_intents(intents);
            }
            if let Some(api_base) = api_base {
                gateway_config = gateway_config.with_api_base(api_base);
            }
            gateway_config.validate()?;

            run(gateway_config, gateway_url).await?;
        }

        Commands::InitConfig { output } => {
            init_config(&output)?;
        }
    }

    Ok(())
}

async fn run(config: GatewayConfig, gateway_url: Option<String>) -> anyhow::Result<()> {
    let endpoint: Arc<dyn EndpointProvider> = match gateway_url {
        Some(url) => Arc::new(StaticEndpoint::parse(&url)?),
        None => Arc::new(RestEndpoint::new(config.api_base.clone(), config.token.clone())),
    };

    info!(intents = %config.intents, "starting wiregate");
    let client = GatewayClient::new(config, endpoint);

    client.subscribe(Arc::new(FnResponder::new(
        EventKind::ALL,
        |event: Arc<GatewayEvent>, _cancel: CancellationToken| async move {
            log_event(&event);
            Ok(())
        },
    )));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        ctrl_c.cancel();
    });

    if let Err(e) = client.run(cancel).await {
        error!(error = %e, close_code = ?e.close_code(), "gateway client failed");
        return Err(e.into());
    }

    Ok(())
}

fn log_event(event: &GatewayEvent) {
    match event {
        GatewayEvent::MessageCreate(message) | GatewayEvent::MessageUpdate(message) => info!(
            event = event.name(),
            channel = %message.channel_id,
            author = ?message.author.as_ref().map(|a| a.username.as_str()),
            content = %message.content,
            "message"
        ),
        GatewayEvent::GuildCreate(guild) | GatewayEvent::GuildUpdate(guild) => {
            info!(event = event.name(), guild = %guild.id, name = %guild.name, "guild");
        }
        other => info!(event = other.name(), "event"),
    }
}

fn init_config(output: &Path) -> anyhow::Result<()> {
    let config = GatewayConfig::default().with_intents(Intents::GUILDS | Intents::GUILD_MESSAGES);
    std::fs::write(output, config.to_toml()?)?;
    println!("Wrote sample config to {}", output.display());
    println!("Set `token` in the file or pass --token / WIREGATE_TOKEN before running.");
    Ok(())
}

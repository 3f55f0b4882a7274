mod cli;
mod stdio;

use clap::Parser;
use cli::{Cli, Command};
use sheerwater_core::chat::{ConversationLoop, LoopSettings};
use sheerwater_core::config::{AppConfig, ServerConfig};
use sheerwater_core::model::AnthropicClient;
use sheerwater_core::rpc::connector_for;
use sheerwater_core::service::ChatService;
use sheerwater_core::tooling::{RpcConnection, ToolInvoker};
use sheerwater_session::InMemoryStore;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let command = cli.command();
    // Interactive output shares the terminal with logs.
    init_tracing(if command == Command::Chat { "warn" } else { "info" });
    debug!(
        ?command,
        config = ?cli.config,
        server_url = ?cli.server_url,
        model = ?cli.model,
        "CLI arguments parsed"
    );

    let mut config = AppConfig::load(cli.config.as_deref())?;
    apply_cli_overrides(&cli, &mut config);
    info!(
        transport = %config.server.transport,
        endpoint = %config.server.endpoint(),
        model = config.model.model.as_str(),
        "Configuration loaded"
    );

    let connector = connector_for(&config.server)?;
    let connection = Arc::new(RpcConnection::new(connector, config.connection.clone()));
    if let Err(err) = connection.connect().await {
        error!(%err, "Tool server unavailable");
        eprintln!("{}", err.user_message());
        return Err(err.into());
    }

    let invoker = Arc::new(ToolInvoker::new(Arc::clone(&connection)));
    let model = Arc::new(AnthropicClient::from_config(&config.model));
    let conversation = ConversationLoop::new(model, invoker, LoopSettings::from(&config.model));
    let service = Arc::new(ChatService::new(
        conversation,
        Arc::new(InMemoryStore::new()),
    ));

    let result = match command {
        Command::Ask {
            prompt,
            conversation,
        } => ask(&service, &cli.user, &prompt.join(" "), conversation.as_deref()).await,
        Command::Tools => {
            for tool in service.list_tools() {
                println!("{:<28} {}", tool.name, tool.description);
            }
            Ok(())
        }
        Command::Chat => stdio::run(Arc::clone(&service), &cli.user)
            .await
            .map_err(Box::<dyn Error>::from),
    };

    connection.shutdown().await;
    info!("Client execution finished");
    result
}

async fn ask(
    service: &ChatService<AnthropicClient>,
    user: &str,
    prompt: &str,
    conversation: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err("prompt must not be empty".into());
    }
    match service.send_message(user, prompt, conversation).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(err) => {
            error!(%err, "Request failed");
            eprintln!("{}", err.user_message());
            Err(err.into())
        }
    }
}

fn apply_cli_overrides(cli: &Cli, config: &mut AppConfig) {
    if let Some(url) = &cli.server_url {
        info!(url = url.as_str(), "Overriding tool server from CLI flag");
        config.server = ServerConfig::sse(url.clone());
    }
    if let Some(model) = &cli.model {
        config.model.model = model.clone();
    }
    if let Some(system) = &cli.system {
        config.model.system_prompt = system.clone();
    }
}

fn init_tracing(default_level: &str) {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_level(true)
            .init();
    });
}

pub mod models;
pub mod config;
pub mod llm;
pub mod cli;
pub mod resolver;
pub mod session;
pub mod server;
pub mod websocket;
pub mod repl;

use cli::{ Args, Mode };
use config::prompt::load_prompts;
use llm::chat::new_client;
use log::info;
use resolver::QueryResolver;
use server::Server;
use session::SessionPolicy;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let llm_config = args.llm_config();
    let policy = SessionPolicy {
        preset_credential: args.preset_credential().map(str::to_owned),
        skip_prompt: args.skip_credential_prompt,
    };

    info!("--- Core Configuration ---");
    info!("Mode: {:?}", args.mode);
    info!("Chat LLM Type: {}", llm_config.llm_type);
    info!("Preset Credential: {}", if policy.preset_credential.is_some() { "yes" } else { "no" });
    info!("Skip Credential Prompt: {}", policy.skip_prompt);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Sampling: {:?}", llm_config.sampling);
    info!("-------------------------");

    let prompts = load_prompts(args.prompts_path.as_deref())?;
    let client = new_client(&llm_config)?;
    info!("Chat client configured: Model={}, URL={}", client.get_model(), client.get_base_url());
    let resolver = Arc::new(QueryResolver::new(client, prompts));

    match args.mode {
        Mode::Server => {
            info!("Starting server on: {}", args.server_addr);
            let server = Server::new(
                args.server_addr.clone(),
                resolver,
                policy,
                args.connections_per_second
            )?;
            server.run().await?;
        }
        Mode::Repl => repl::run(resolver, policy).await?,
    }

    Ok(())
}

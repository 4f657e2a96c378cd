mod agent;
mod config;
mod dataset;
mod documents;
mod llm;
mod openai;
mod shell;
mod tools;

use anyhow::Result;
use std::sync::Arc;

use agent::Orchestrator;
use config::{Config, CredentialConfig};
use dataset::Table;
use documents::DocumentIndex;
use openai::OpenAiClient;
use tools::{DocumentQueryTool, NoteSink, TabularQueryTool, ToolRegistry};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Load configuration
    let config = Config::load("config.toml")?;

    // Initialize logging
    init_logging(&config.logging.level);
    log::info!("Starting factbook...");

    let credential = CredentialConfig::from_env()?;
    log::info!("Credential found, using model {}", config.openai.model);

    let client = Arc::new(OpenAiClient::new(
        config.openai.endpoint.clone(),
        config.openai.model.clone(),
        config.openai.embedding_model.clone(),
        credential.api_key,
    ));

    // Load population data
    let table = Table::from_csv_path(&config.population.path)?;
    log::info!(
        "Loaded {} rows from {}",
        table.row_count(),
        config.population.path.display()
    );

    // Load or build the document index
    let index = DocumentIndex::load_or_build(
        &config.documents.source,
        &config.documents.index_dir,
        client.as_ref(),
        config.documents.chunk_size,
    )
    .await?;

    let temperature = config.openai.temperature;
    let registry = ToolRegistry::new(vec![
        NoteSink::new(&config.notes.path).into(),
        TabularQueryTool::new(
            table,
            client.clone(),
            temperature,
            config.population.preview_rows,
            config.population.synthesize_response,
        )
        .into(),
        DocumentQueryTool::new(index, client.clone(), client.clone(), temperature, config.documents.top_k).into(),
    ])?;

    let mut orchestrator = Orchestrator::new(client, registry, config.agent.context.clone())
        .with_temperature(temperature)
        .with_max_iterations(config.agent.max_iterations)
        .with_max_history_turns(config.agent.max_history_turns);

    let tool_names: Vec<&str> = orchestrator.registry().list().iter().map(|d| d.name).collect();
    log::info!("Agent ready with tools: {}", tool_names.join(", "));

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    shell::run(&mut orchestrator, stdin.lock(), stdout.lock()).await?;

    log::info!("Bye");
    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filters) => builder.parse_filters(&filters),
        Err(_) => builder.parse_filters(level),
    };
    builder.init();
}

use std::sync::Arc;

use dotenv::dotenv;
use market_lookup_agent::{
    audit::AuditLog,
    config::Config,
    llm::{GeminiLlm, LanguageModel},
    orchestrator::Orchestrator,
    steps::{FallbackResponder, Fetcher, Planner, Summarizer},
    tools::create_default_registry,
    transcript::Transcript,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_lookup_agent=info".into()),
        )
        .init();

    info!("Market Lookup Agent starting");

    // Missing credentials are fatal here, never per-call
    let config = Config::from_env()?;

    let llm: Arc<dyn LanguageModel> = Arc::new(GeminiLlm::new(config.gemini_api_key.clone()));
    let registry = Arc::new(create_default_registry(&config));

    let orchestrator = Orchestrator::new(
        Planner::new(llm.clone(), config.llm_retry),
        Fetcher::new(registry, config.tool_retry, config.dedupe_requested_tools),
        Summarizer::new(llm.clone(), config.llm_retry),
        FallbackResponder::new(llm, config.llm_retry),
        AuditLog::new(),
    );

    println!("Market lookup agent ready. Type 'exit' to quit.");
    println!("Use 'lookup stock: <symbol>' to look up a ticker. Anything else is handled conversationally.\n");

    // One transcript per interactive session, one fresh state per run
    let mut transcript = Transcript::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        match orchestrator.run(input, &mut transcript).await {
            Ok(report) => println!("AI: {}", report.reply),
            Err(error) => println!("AI: Could not complete that request: {}", error),
        }
    }

    Ok(())
}

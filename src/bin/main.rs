use catalog_agent::{AgentConfig, Orchestrator, QueryRequest};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("usage: agent <question>");
        std::process::exit(2);
    }
    let question = args.join(" ");

    let config = AgentConfig::from_env()?;
    let orchestrator = Orchestrator::from_config(&config).await?;

    info!(model = orchestrator.model_name(), "Catalog agent ready");

    match orchestrator.run(QueryRequest::new(question)).await {
        Ok(reply) => {
            println!("{}", reply.answer);
            println!("\n=== TRACE ===");
            for (i, entry) in reply.trace.iter().enumerate() {
                println!("  {}: {}", i + 1, serde_json::to_string(entry)?);
            }
            println!(
                "\nRequests: {}  Tokens: {} in / {} out  Tool calls: {}",
                reply.usage.requests,
                reply.usage.input_tokens,
                reply.usage.output_tokens,
                reply.usage.tool_calls
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Query failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}

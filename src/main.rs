use anyhow::{bail, Context, Result};
use clap::Parser;
use sl_agent::config::{AgentConfig, SemanticLayerSource};
use sl_agent::llm::{LlmClient, Reasoner, ScriptedReasoner};
use sl_agent::tools::{HttpSemanticLayer, InMemorySemanticLayer, SemanticLayer, ToolRuntime};
use sl_agent::{ChatSession, Orchestrator, TurnOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sl-agent")]
#[command(about = "Ask natural-language questions about a semantic data layer")]
struct Args {
    /// Ask one question and exit instead of starting the interactive shell
    question: Option<String>,

    /// JSON project fixture to serve the semantic layer from
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Base URL of the semantic-layer REST API
    #[arg(long)]
    semantic_url: Option<String>,

    /// Run without an LLM (keyword classification only)
    #[arg(long)]
    offline: bool,

    /// LLM model name (or set OPENAI_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Concurrent schema discovery fetches
    #[arg(long)]
    concurrency: Option<usize>,

    /// Print the explanation trace after every answer
    #[arg(long)]
    trace: bool,
}

const HELP: &str = "\
Commands:
  /schema   show the available models and explores
  /explain  show how the last answer was reached
  /clear    forget the conversation (keeps the schema)
  /reset    forget everything, including the schema
  /help     show this help
  /quit     exit

Press Ctrl-C while a question is running to cancel it.";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sl_agent=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let layer = build_layer(&config)?;
    let reasoner = build_reasoner(&args, &config, Arc::clone(&layer))?;

    let mut session = ChatSession::new(Orchestrator::with_layer(layer, reasoner, &config));

    if let Some(question) = args.question.as_deref() {
        let outcome = session.chat(question).await;
        print_outcome(&outcome, args.trace);
        if outcome.is_failed() {
            std::process::exit(1);
        }
        return Ok(());
    }

    repl(&mut session, args.trace).await
}

fn build_config(args: &Args) -> Result<AgentConfig> {
    let mut config = AgentConfig::from_env().context("Failed to read configuration")?;
    if let Some(path) = &args.fixture {
        config.semantic_layer = Some(SemanticLayerSource::Fixture(path.clone()));
    } else if let Some(url) = &args.semantic_url {
        let token = std::env::var("SL_AGENT_SEMANTIC_TOKEN").ok();
        config.semantic_layer = Some(SemanticLayerSource::Http {
            base_url: url.clone(),
            token,
        });
    }
    if let Some(model) = &args.model {
        config.llm.model = model.clone();
    }
    if let Some(n) = args.concurrency {
        config.discovery_concurrency = n;
    }
    config.normalize();
    Ok(config)
}

fn build_layer(config: &AgentConfig) -> Result<Arc<dyn SemanticLayer>> {
    match &config.semantic_layer {
        Some(SemanticLayerSource::Fixture(path)) => {
            info!("Using fixture {}", path.display());
            let layer = InMemorySemanticLayer::load(path)
                .with_context(|| format!("Failed to load fixture {}", path.display()))?;
            Ok(Arc::new(layer))
        }
        Some(SemanticLayerSource::Http { base_url, token }) => {
            info!("Using semantic layer at {}", base_url);
            let layer = HttpSemanticLayer::new(base_url, token.clone(), config.llm.timeout_secs)?;
            Ok(Arc::new(layer))
        }
        None => bail!("No semantic layer configured: pass --fixture or --semantic-url (or set SL_AGENT_FIXTURE / SL_AGENT_SEMANTIC_URL)"),
    }
}

fn build_reasoner(args: &Args, config: &AgentConfig, layer: Arc<dyn SemanticLayer>) -> Result<Arc<dyn Reasoner>> {
    if args.offline || config.llm.api_key.is_empty() {
        if !args.offline {
            warn!("OPENAI_API_KEY not set, running offline");
        }
        return Ok(Arc::new(ScriptedReasoner::new()));
    }
    let client = LlmClient::new(
        config.llm.clone(),
        Some(ToolRuntime::new(layer)),
        config.tool_binding_capacity,
    )?;
    Ok(Arc::new(client))
}

fn print_outcome(outcome: &TurnOutcome, show_trace: bool) {
    match &outcome.final_response {
        Some(response) => println!("\n{}\n", response),
        None => match &outcome.state.error {
            Some(err) => println!("\n❌ {}\n", err.message),
            None => println!("\n❌ No response\n"),
        },
    }
    if show_trace {
        println!("{}\n", outcome.explanation_trace.join("\n"));
    }
}

async fn repl(session: &mut ChatSession, show_trace: bool) -> Result<()> {
    println!("Semantic layer assistant (session {}). Type /help for commands.", session.id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("> ");
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/explain" => println!("{}", session.show_trace()),
            "/clear" => {
                session.clear_history();
                println!("Conversation cleared.");
            }
            "/reset" => {
                session.reset().await;
                println!("Session reset. The schema will be rediscovered on the next question.");
            }
            "/schema" => match session.schema_overview().await {
                Ok(tree) => println!("\n{}\n", tree),
                Err(e) => println!("❌ {}", e),
            },
            cmd if cmd.starts_with('/') => println!("Unknown command {}. Type /help.", cmd),
            question => {
                let cancel = CancellationToken::new();
                let guard = cancel.clone();
                let watcher = tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        guard.cancel();
                    }
                });
                let outcome = session.chat_with_cancel(question, &cancel).await;
                watcher.abort();
                print_outcome(&outcome, show_trace);
            }
        }
    }
    Ok(())
}

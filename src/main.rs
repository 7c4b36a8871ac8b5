use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indicator_desk::{
    api,
    completion::get_completion_client,
    config,
    context::ContextAssembler,
    conversation::ConversationService,
    ingest,
    logging,
    model::{Category, FileMetadata, Role},
    store::{self, PersistenceGateway},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "indicator-desk",
    about = "Ask questions about municipal indicator files"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the REST store server.
    Serve,
    /// Extract files (or directories of files) and add them to the catalog.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long, default_value = "Geral")]
        category: Category,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        period: Option<String>,
        #[arg(long)]
        case_name: Option<String>,
    },
    /// List the catalog.
    Files,
    /// Remove a file from the catalog.
    Remove { id: String },
    /// Ask a question grounded in the catalog.
    Ask { question: String },
    /// Print the transcript.
    History,
    /// Show which backend is serving requests.
    Status,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();
    config::init_config().context("failed to load configuration")?;

    match cli.command {
        Command::Serve => serve().await,
        Command::Ingest {
            paths,
            category,
            description,
            source,
            period,
            case_name,
        } => {
            let metadata = FileMetadata {
                description,
                source,
                period,
                case_name,
                category,
            };
            ingest_paths(&paths, metadata).await
        }
        Command::Files => {
            let gateway = open_gateway()?;
            let files = gateway.list_files().await?;
            for file in &files {
                println!(
                    "{}\t{}\t{}\t{}\t{} chars",
                    file.id,
                    file.name,
                    file.kind,
                    file.metadata.category.label(),
                    file.content.chars().count()
                );
            }
            print_backend(&gateway);
            Ok(())
        }
        Command::Remove { id } => {
            let gateway = open_gateway()?;
            gateway.delete_file(&id).await?;
            println!("removed {id}");
            print_backend(&gateway);
            Ok(())
        }
        Command::Ask { question } => ask(&question).await,
        Command::History => {
            let gateway = open_gateway()?;
            for message in gateway.list_messages().await? {
                let speaker = match message.role {
                    Role::User => "você",
                    Role::Assistant => "assistente",
                };
                println!("[{speaker}] {}", message.text);
                if let Some(chart) = &message.chart_data {
                    println!(
                        "  (gráfico: {}, {} linhas)",
                        chart.title().unwrap_or("sem título"),
                        chart.rows().len()
                    );
                }
            }
            print_backend(&gateway);
            Ok(())
        }
        Command::Status => {
            let gateway = open_gateway()?;
            let files = gateway.list_files().await?;
            println!("{} files in catalog", files.len());
            print_backend(&gateway);
            Ok(())
        }
    }
}

fn open_gateway() -> Result<PersistenceGateway> {
    store::gateway_from_config().context("failed to open storage backends")
}

fn print_backend(gateway: &PersistenceGateway) {
    println!("backend: {}", gateway.current_backend());
}

async fn serve() -> Result<()> {
    let config = config::get_config();
    let document = api::JsonDocumentStore::open(&config.data_dir)
        .await
        .context("failed to open document store")?;
    tracing::info!(path = %document.path().display(), "Serving document store");
    let app = api::create_router(Arc::new(document));

    let listener = TcpListener::bind((std::net::Ipv4Addr::UNSPECIFIED, config.server_port))
        .await
        .with_context(|| format!("failed to bind port {}", config.server_port))?;
    tracing::info!("Listening on http://0.0.0.0:{}", config.server_port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ingest_paths(paths: &[PathBuf], metadata: FileMetadata) -> Result<()> {
    let selection = ingest::read_selection(paths).context("failed to read selected files")?;
    let gateway = open_gateway()?;
    let mut failures = 0;
    for result in ingest::ingest_batch(selection, &metadata).await {
        match result {
            Ok(file) => {
                gateway.add_file(&file).await?;
                println!("added {}\t{}", file.id, file.name);
            }
            Err(error) => {
                failures += 1;
                println!("could not read {}: {error}", error.filename());
            }
        }
    }
    print_backend(&gateway);
    if failures > 0 {
        bail!("{failures} file(s) could not be read");
    }
    Ok(())
}

async fn ask(question: &str) -> Result<()> {
    let config = config::get_config();
    let Some(completion) = get_completion_client()? else {
        bail!("no completion provider configured; set COMPLETION_PROVIDER=ollama");
    };
    let gateway = Arc::new(open_gateway()?);
    let transcript = gateway.list_messages().await?;
    let service = ConversationService::new(
        Arc::clone(&gateway),
        completion,
        ContextAssembler::from_config(),
        config.completion_model.clone(),
    );

    let outcome = service.ask(&transcript, question).await?;
    println!("{}", outcome.reply.text);
    if let Some(chart) = &outcome.reply.chart_data {
        println!("{}", serde_json::to_string_pretty(chart)?);
    }
    print_backend(&gateway);
    Ok(())
}

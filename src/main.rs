use autoserve::application::notifications::NotificationOutbox;
use autoserve::config::AppConfig;
use autoserve::infrastructure::clock::SystemClock;
use autoserve::infrastructure::in_memory::InMemoryStore;
use autoserve::infrastructure::media::InMemoryImageStore;
use autoserve::infrastructure::notifier::LoggingNotifier;
use autoserve::infrastructure::sandbox::SandboxPaymentProvider;
use autoserve::interfaces::csv::command_reader::CommandReader;
use autoserve::interfaces::csv::invoice_writer::InvoiceWriter;
use autoserve::interfaces::dispatcher::CommandDispatcher;
use autoserve::interfaces::seed::Seed;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// JSON file with the users, vehicles and inventory to start from
    #[arg(long)]
    seed: PathBuf,

    /// Payment gateway key secret; overrides AUTOSERVE_PAYMENT_KEY_SECRET
    #[arg(long)]
    payment_secret: Option<String>,

    /// Accept `simulate_pay` commands
    #[arg(long)]
    allow_simulated_payments: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let mut config = AppConfig::from_env().into_diagnostic()?;
    if let Some(secret) = cli.payment_secret {
        config.payment.key_secret = Some(secret);
    }
    if cli.allow_simulated_payments {
        config.payment.allow_simulated_payments = true;
    }

    let store = InMemoryStore::new();
    let seed = Seed::from_reader(File::open(&cli.seed).into_diagnostic()?).into_diagnostic()?;
    seed.load_into(&store).await.into_diagnostic()?;

    let provider = Arc::new(SandboxPaymentProvider::new(config.payment.key_secret.clone()));
    let (outbox, worker) = NotificationOutbox::start(Arc::new(LoggingNotifier));
    let dispatcher = CommandDispatcher::new(
        store,
        provider,
        Arc::new(InMemoryImageStore::new()),
        outbox,
        Arc::new(SystemClock),
        config,
    );

    // Process commands
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for record in reader.commands() {
        match record {
            Ok(record) => {
                if let Err(e) = dispatcher.dispatch(record).await {
                    eprintln!("Error processing command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    let invoices = dispatcher.invoices().await.into_diagnostic()?;
    drop(dispatcher);
    worker.drained().await;

    let stdout = io::stdout();
    let mut writer = InvoiceWriter::new(stdout.lock());
    writer.write_invoices(&invoices).into_diagnostic()?;

    Ok(())
}

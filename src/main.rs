use clap::{Parser, Subcommand};
use credits::service::{boot, generator, Orchestrator};

#[derive(Parser, Debug)]
#[command(name = "credits", version, about = "Credit ledger and payment-event processor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a capture file of gateway deliveries to replay
    #[arg(value_name = "FILE")]
    file: Option<String>,

    /// Shared secret for webhook signature verification
    #[arg(long, default_value = "whsec_test", value_name = "SECRET")]
    secret: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a signed mock capture file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "deliveries.jsonl", value_name = "FILE")]
        output: String,

        /// Number of deliveries to generate
        #[arg(short, long, default_value = "50", value_name = "COUNT")]
        count: usize,

        /// Shared secret to sign with
        #[arg(long, default_value = "whsec_test", value_name = "SECRET")]
        secret: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Cli::parse();

    match args.command {
        Some(Commands::Generate {
            output,
            count,
            secret,
        }) => {
            generator(&output, count, &secret)?;
        }
        None => {
            let file = args
                .file
                .ok_or("Please provide a capture file path or use the 'generate' command")?;

            let (ledger, processor) = boot(&args.secret);
            let orchestrator = Orchestrator::new(ledger, processor);
            let summary = orchestrator.replay(&file).await?;
            eprintln!(
                "processed={} duplicates={} failed={} rejected={}",
                summary.processed, summary.duplicates, summary.failed, summary.rejected
            );
        }
    }

    Ok(())
}

//! Command-line front end for the courier email queue
//!
//! - `courier enqueue` validates an email, queues it and saves the queue
//! - `courier send` delivers everything queued through the configured SMTP relay
//! - `courier queue list` shows what is waiting

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use courier::{
    Courier, DispatchOutcome, ShutdownCoordinator,
    controller::run_dispatch,
};
use courier_common::logging;
use courier_delivery::{DeliveryError, DeliveryReceipt, SmtpTransport};
use tokio::sync::mpsc;

/// A durable, retrying outbound email queue
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Queue and deliver outbound email", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (overrides `COURIER_CONFIG` and the default locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate an email and add it to the queue
    Enqueue {
        #[arg(short, long)]
        subject: String,
        #[arg(short, long)]
        body: String,
        /// Recipient address
        #[arg(short, long)]
        to: String,
    },
    /// Deliver everything in the queue, retrying failures
    Send,
    /// Inspect the saved queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// List queued emails in delivery order
    List,
}

fn print_receipt(receipt: &DeliveryReceipt) {
    println!("Email sent to {}", receipt.recipient);
    println!("Subject: {}", receipt.subject);
    println!("Body: {}", receipt.body);
}

async fn send(courier: &Courier) -> anyhow::Result<()> {
    let transport = SmtpTransport::from_env().map_err(DeliveryError::from)?;
    let dispatcher = courier.open().await?;

    let (receipts_tx, mut receipts_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(receipt) = receipts_rx.recv().await {
            print_receipt(&receipt);
        }
    });

    let outcome = run_dispatch(
        &dispatcher,
        Arc::new(transport),
        ShutdownCoordinator::wait_for_signal(),
        Some(receipts_tx),
    )
    .await;

    // Finishes once every worker has dropped its sender
    printer.await?;

    match outcome? {
        DispatchOutcome::Finished(report) => {
            println!(
                "Delivered {}, gave up on {}, {} retries",
                report.delivered, report.exhausted, report.retried
            );
        }
        DispatchOutcome::Interrupted { saved } => {
            println!("Interrupted, {saved} emails saved for next time");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let courier = Courier::load(cli.config.as_deref())?;
    let _log_guard = logging::init(&courier.logging);

    match cli.command {
        Commands::Enqueue { subject, body, to } => {
            courier.open().await?.enqueue(subject, body, &to).await?;
            println!("Queued email to {to}");
        }
        Commands::Send => send(&courier).await?,
        Commands::Queue {
            action: QueueAction::List,
        } => {
            let pending = courier.pending().await?;
            if pending.is_empty() {
                println!("Queue is empty");
            }
            for (position, task) in pending.iter().enumerate() {
                println!("{:>4}. {task}", position + 1);
            }
        }
    }

    Ok(())
}

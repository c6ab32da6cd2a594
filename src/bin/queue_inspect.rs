use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Url;

use queue_dashboard::dashboard::{ProxyClient, QueueDashboard};
use queue_dashboard::model::QueueView;

#[derive(Debug, Parser)]
#[command(author, version, about = "Inspect pipeline queues through the dashboard proxy")]
struct Args {
    /// Base URL of the running dashboard proxy
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    proxy_url: Url,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load one queue and print it as a table
    Show {
        /// Queue view to load
        #[arg(long, default_value = "ingested")]
        view: String,

        /// Row index to open in the detail pane
        #[arg(long)]
        row: Option<usize>,
    },
    /// Forward a raw status payload for one item
    SetStatus {
        #[arg(long)]
        content_id: String,

        /// JSON body, sent unmodified
        #[arg(long)]
        body: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let client = ProxyClient::new(args.proxy_url)?;

    match args.command {
        Command::Show { view, row } => {
            let view: QueueView = view.parse()?;
            let mut dash = QueueDashboard::new(view);
            let ticket = dash.mount();
            dash.fetch(ticket, &client).await;
            if let Some(index) = row {
                if !dash.click_row(index) {
                    eprintln!("row {index} is not available");
                }
            }
            print!("{}", dash.render_text());
        }
        Command::SetStatus { content_id, body } => {
            let outcome = client
                .post_status(&content_id, body)
                .await
                .context("status update failed")?;
            println!("status: {}", outcome.status);
            println!("{}", outcome.body);
            if !outcome.is_success() {
                bail!("upstream rejected status update ({})", outcome.status);
            }
        }
    }
    Ok(())
}

//! `genesisdb-tail`: follow a subject and print each event as a JSON line.

use anyhow::Context;
use clap::Parser;
use genesisdb_client::{Cursor, EventId, GenesisClient, ObserveOptions, Subject};

#[derive(Parser)]
#[command(name = "genesisdb-tail")]
#[command(about = "Tail a GenesisDB subject (configured via GENESISDB_* variables)", long_about = None)]
struct Cli {
    /// Subject to follow, e.g. /customer
    subject: String,

    /// Start strictly after this event id
    #[arg(long, conflicts_with = "latest")]
    after: Option<String>,

    /// Only the latest event of this type per subject
    #[arg(long)]
    latest: Option<String>,

    /// Events buffered ahead of output
    #[arg(long, default_value_t = genesisdb_client::observe::DEFAULT_PREFETCH)]
    prefetch: usize,
}

impl Cli {
    fn cursor(&self) -> anyhow::Result<Cursor> {
        if let Some(id) = &self.after {
            let id: EventId = id.parse().context("invalid --after event id")?;
            return Ok(Cursor::after(id));
        }
        Ok(self
            .latest
            .as_ref()
            .map_or(Cursor::Start, Cursor::latest_by_event_type))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    genesisdb_observability::init();
    let cli = Cli::parse();

    let subject = Subject::new(cli.subject.as_str()).context("invalid subject")?;
    let options = ObserveOptions::new(cli.cursor()?).with_prefetch(cli.prefetch);
    let client = GenesisClient::from_env().context("failed to configure client")?;

    let mut observation = client.observe(&subject, options)?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                observation.cancel();
                break;
            }
            next = observation.next_event() => match next {
                Some(Ok(event)) => println!("{}", serde_json::to_string(&event)?),
                Some(Err(err)) => return Err(err).context("observation failed"),
                None => break,
            },
        }
    }

    tracing::info!(resume = ?observation.resume_cursor(), "tail stopped");
    Ok(())
}

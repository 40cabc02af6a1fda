use {anyhow::Result, clap::Subcommand, serde_json::json};

use portico_channels::{ConnectorKind, Readiness, readiness};

#[derive(Subcommand)]
pub enum ChannelAction {
    /// Report which connectors would start with the current config.
    Status {
        /// Print the report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

pub fn handle_channels(action: ChannelAction) -> Result<()> {
    match action {
        ChannelAction::Status { json } => status(json),
    }
}

fn status(as_json: bool) -> Result<()> {
    let config = portico_config::discover_and_load().channels;
    let report: Vec<_> = ConnectorKind::ALL
        .into_iter()
        .map(|kind| (kind, readiness::check(kind, &config)))
        .collect();

    if as_json {
        let entries: serde_json::Map<_, _> = report
            .iter()
            .map(|(kind, readiness)| {
                let value = match readiness {
                    Readiness::Ready(plan) => json!({
                        "ready": true,
                        "mode": plan.status.mode,
                        "baseUrl": plan.status.base_url,
                    }),
                    Readiness::Skip(reason) => json!({
                        "ready": false,
                        "reason": reason.as_str(),
                    }),
                };
                (kind.to_string(), value)
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for (kind, readiness) in &report {
        match readiness {
            Readiness::Ready(plan) => {
                let detail = plan
                    .status
                    .mode
                    .as_deref()
                    .or(plan.status.base_url.as_deref())
                    .or(plan.status.cli_path.as_deref())
                    .unwrap_or("");
                println!("  {:<10} ready    {detail}", kind.as_str());
            },
            Readiness::Skip(reason) => {
                println!("  {:<10} skipped  ({reason})", kind.as_str())
            },
        }
    }
    Ok(())
}

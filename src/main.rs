//! Command-line runner for checking configuration against a live project.
//!
//! Lists, searches or counts the instances of one view and prints them as
//! JSON. Connection settings come from the `VIEWGRAPH_*` environment
//! variables (a `.env` file is honoured).

mod cli;

use std::env;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use viewgraph::api::{AggregateResult, Aggregation, InstancesApi};
use viewgraph::config::ClientConfig;
use viewgraph::filters::{FilterContainer, TextFilter};
use viewgraph::transport::HttpTransport;

use crate::cli::{CliOptions, Command};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "viewgraph=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let options = CliOptions::parse(env::args().skip(1))?;
    let config = ClientConfig::from_env()?;
    info!(project = %config.project, base_url = %config.base_url, "Starting viewgraph");

    let transport = HttpTransport::new(&config).context("Failed to build HTTP client")?;
    let api = InstancesApi::new(&transport);

    let mut filters = FilterContainer::and();
    if let Some((property, prefix)) = &options.prefix {
        filters.push(TextFilter::new(options.view.property_path(property)).prefix(prefix.as_str()));
    }

    let output = match options.command {
        Command::List => {
            let mut query = api.list(&options.view).filter(&filters);
            query = match options.limit {
                Some(limit) => query.limit(limit),
                None => query.unbounded(),
            };
            serde_json::to_value(query.fetch_all().await?)?
        }
        Command::Search => {
            let mut query = api
                .search(&options.view, options.query.clone().unwrap_or_default())
                .filter(&filters);
            query = match options.limit {
                Some(limit) => query.limit(limit),
                None => query.unbounded(),
            };
            serde_json::to_value(query.fetch_all().await?)?
        }
        Command::Count => {
            let mut query = api
                .aggregate(&options.view, vec![Aggregation::count()])
                .filter(&filters);
            if let Some(text) = &options.query {
                query = query.query(text.as_str(), None);
            }
            match query.fetch().await? {
                AggregateResult::Single(value) => serde_json::json!({ "count": value.value }),
                other => serde_json::json!({ "count": other.value() }),
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

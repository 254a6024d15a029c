//! Minimal CLI parsing for the smoke-test runner.

use anyhow::{Context, Result, bail};

use viewgraph::models::ViewReference;

pub const USAGE: &str = "usage: viewgraph <list|search|count> <space> <view> <version> \
[--limit N] [--all] [--query TEXT] [--prefix PROPERTY=VALUE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Search,
    Count,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    pub command: Command,
    pub view: ViewReference,
    /// `None` reads every page.
    pub limit: Option<usize>,
    pub query: Option<String>,
    /// `(property, prefix)` text filter.
    pub prefix: Option<(String, String)>,
}

impl CliOptions {
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let command = match args.next().as_deref() {
            Some("list") => Command::List,
            Some("search") => Command::Search,
            Some("count") => Command::Count,
            Some(other) => bail!("unknown command '{other}'\n{USAGE}"),
            None => bail!("{USAGE}"),
        };

        let space = args.next().context(USAGE)?;
        let view = args.next().context(USAGE)?;
        let version = args.next().context(USAGE)?;

        let mut options = CliOptions {
            command,
            view: ViewReference::new(space, view, version),
            limit: Some(viewgraph::api::DEFAULT_LIMIT),
            query: None,
            prefix: None,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--limit" => {
                    let value = args.next().context("--limit needs a value")?;
                    options.limit = Some(value.parse().context("Invalid --limit")?);
                }
                "--all" => options.limit = None,
                "--query" => options.query = Some(args.next().context("--query needs a value")?),
                "--prefix" => {
                    let value = args.next().context("--prefix needs PROPERTY=VALUE")?;
                    let (property, prefix) = value
                        .split_once('=')
                        .context("--prefix needs PROPERTY=VALUE")?;
                    options.prefix = Some((property.to_string(), prefix.to_string()));
                }
                other => bail!("unexpected argument '{other}'\n{USAGE}"),
            }
        }

        Ok(options)
    }
}

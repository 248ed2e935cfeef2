mod args;
mod output;

use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{Context, Result};
use spfcheck_lib::{PolicyRecord, SpfClient, SpfOptions, SpfResolver};

use crate::args::{Cli, Commands};
use crate::output::OutputRow;

type Client = SpfClient<Arc<dyn SpfResolver + Send + Sync>>;

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_filter())),
        )
        .with_writer(io::stderr)
        .init();

    if let Some(Commands::Parse { record }) = &cli.cmd {
        let parsed: PolicyRecord = record
            .parse()
            .with_context(|| format!("parse record '{record}'"))?;
        return output::write_record(&parsed, &cli);
    }

    let options = cli.options()?;
    let mut rows: Vec<OutputRow> = Vec::new();

    if cli.stdin {
        let client = build_client(options, cli.cache)?;
        for line in io::stdin().lock().lines() {
            let line = line.context("read stdin")?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let sender = fields.next().unwrap_or_default();
            let ip = fields.next().unwrap_or_default();
            let outcome = match fields.next() {
                Some(helo) => match ip.parse() {
                    Ok(addr) => client.query_with_helo(sender, addr, helo),
                    Err(_) => client.query(sender, ip),
                },
                None => client.query(sender, ip),
            };
            rows.push(outcome.into());
        }
    } else if let Some(Commands::Check { sender, ip, helo }) = &cli.cmd {
        let client = build_client(options, cli.cache)?;
        let outcome = match (helo, ip.trim().parse()) {
            (Some(helo), Ok(addr)) => client.query_with_helo(sender, addr, helo),
            _ => client.query(sender, ip),
        };
        rows.push(outcome.into());
    } else {
        Cli::clap_command().print_help()?;
        println!();
        return Ok(());
    }

    output::write_reports(&rows, &cli)?;

    let code = output::exit_code(&rows);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

#[cfg(feature = "with-dns")]
fn build_client(options: SpfOptions, cache: bool) -> Result<Client> {
    let system = spfcheck_lib::system_resolver(&options).context("init system resolver")?;
    let resolver: Arc<dyn SpfResolver + Send + Sync> = if cache {
        let ttl = options.cache_ttl().unwrap_or(std::time::Duration::from_secs(300));
        Arc::new(spfcheck_lib::CachingResolver::with_ttl(system, ttl))
    } else {
        Arc::new(system)
    };
    Ok(SpfClient::with_options(resolver, options))
}

#[cfg(not(feature = "with-dns"))]
fn build_client(_options: SpfOptions, _cache: bool) -> Result<Client> {
    anyhow::bail!("les requêtes DNS nécessitent la feature 'with-dns'")
}

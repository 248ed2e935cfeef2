use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(feature = "with-serde")]
use anyhow::Context;
use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use spfcheck_lib::SpfOptions;

#[derive(Parser)]
#[command(name = "spfcheck-cli", about = "Évalue les politiques SPF (RFC 7208)")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,

    /// lit des lignes "expéditeur ip [helo]" depuis stdin
    #[arg(long)]
    pub stdin: bool,

    /// write report to file (JSON/NDJSON/CSV selon --format)
    #[arg(long)]
    pub out: Option<String>,

    /// format: human|json|ndjson|csv
    #[arg(long, default_value = "human")]
    pub format: String,

    /// fichier de configuration JSON (feature `with-serde`)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// limite de requêtes DNS par vérification
    #[arg(long = "max-lookups")]
    pub max_dns_lookups: Option<usize>,

    /// limite de réponses vides/NXDOMAIN
    #[arg(long = "max-void-lookups")]
    pub max_void_lookups: Option<usize>,

    /// timeout DNS (ms)
    #[arg(long = "timeout")]
    pub timeout_ms: Option<u64>,

    /// domaine du récepteur pour %{r}
    #[arg(long)]
    pub receiving_domain: Option<String>,

    /// garde les réponses DNS en mémoire entre deux vérifications
    #[arg(long)]
    pub cache: bool,

    /// verbosité des logs (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// vérifie qu'une IP peut émettre pour l'expéditeur
    Check {
        /// adresse (local@domaine) ou domaine seul
        sender: String,
        /// adresse IPv4 ou IPv6 du client SMTP
        ip: String,
        /// identité HELO/EHLO
        #[arg(long)]
        helo: Option<String>,
    },
    /// analyse un enregistrement sans interroger le DNS
    Parse {
        /// texte de l'enregistrement, ex. "v=spf1 mx -all"
        record: String,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn clap_command() -> clap::Command {
        <Self as clap::CommandFactory>::command()
    }

    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "spfcheck_lib=debug",
            _ => "spfcheck_lib=trace",
        }
    }

    /// Options from `--config` (if any), overridden by explicit flags.
    pub fn options(&self) -> Result<SpfOptions> {
        let mut options = match &self.config {
            Some(path) => load_config(path)?,
            None => SpfOptions::default(),
        };
        if let Some(limit) = self.max_dns_lookups {
            options = options.with_max_dns_lookups(limit);
        }
        if let Some(limit) = self.max_void_lookups {
            options = options.with_max_void_lookups(limit);
        }
        if let Some(ms) = self.timeout_ms {
            options = options.with_timeout(Duration::from_millis(ms));
        }
        if let Some(domain) = &self.receiving_domain {
            options = options.with_receiving_domain(domain.as_str());
        }
        Ok(options)
    }
}

#[cfg(feature = "with-serde")]
fn load_config(path: &Path) -> Result<SpfOptions> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
}

#[cfg(not(feature = "with-serde"))]
fn load_config(path: &Path) -> Result<SpfOptions> {
    anyhow::bail!(
        "--config {} nécessite la feature 'with-serde'",
        path.display()
    )
}

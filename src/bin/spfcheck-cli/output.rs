#[cfg(any(feature = "with-serde", feature = "with-csv"))]
use anyhow::Context;
use anyhow::{Result, bail};

use crate::args::Cli;
use spfcheck_lib::{PolicyRecord, QueryOutcome, SpfResult, Term};

#[cfg_attr(feature = "with-serde", derive(serde::Serialize))]
#[cfg_attr(not(feature = "with-serde"), allow(dead_code))]
pub struct OutputRow {
    pub sender: String,
    pub domain: String,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub client_ip: Option<String>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub helo: Option<String>,
    pub result: SpfResult,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub explanation: Option<String>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub problem: Option<String>,
    pub dns_lookups: usize,
    pub void_lookups: usize,
    pub received_spf: String,
}

impl From<QueryOutcome> for OutputRow {
    fn from(outcome: QueryOutcome) -> Self {
        let received_spf = outcome.header_value();
        Self {
            sender: outcome.sender,
            domain: outcome.domain,
            client_ip: outcome.client_ip.map(|ip| ip.to_string()),
            helo: outcome.helo,
            result: outcome.result,
            explanation: outcome.explanation,
            problem: outcome.error.map(|err| err.to_string()),
            dns_lookups: outcome.dns_lookups,
            void_lookups: outcome.void_lookups,
            received_spf,
        }
    }
}

pub fn write_reports(rows: &[OutputRow], cli: &Cli) -> Result<()> {
    match cli.format.as_str() {
        "human" => write_human(rows),
        "json" => write_json(rows, cli),
        "ndjson" => write_ndjson(rows, cli),
        "csv" => write_csv(rows, cli),
        other => bail!("unknown --format '{other}', use: human|json|ndjson|csv"),
    }
}

/// codes de sortie : 0 pass/neutral/none, 2 fail/softfail, 3 erreurs
pub fn exit_code(rows: &[OutputRow]) -> i32 {
    if rows.iter().any(|row| row.result.is_error()) {
        3
    } else if rows
        .iter()
        .any(|row| matches!(row.result, SpfResult::Fail | SpfResult::SoftFail))
    {
        2
    } else {
        0
    }
}

fn write_human(rows: &[OutputRow]) -> Result<()> {
    for row in rows {
        let tag = format!("[{}]", row.result.as_str().to_ascii_uppercase());
        match &row.client_ip {
            Some(ip) => println!("{tag:<12}{} from {ip}", row.sender),
            None => println!("{tag:<12}{}", row.sender),
        }
        if let Some(explanation) = &row.explanation {
            println!("            explanation: {explanation}");
        }
        if let Some(problem) = &row.problem {
            println!("            problem: {problem}");
        }
        println!(
            "            lookups: dns={} void={}",
            row.dns_lookups, row.void_lookups
        );
        println!("            received-spf: {}", row.received_spf);
    }
    Ok(())
}

#[cfg(feature = "with-serde")]
fn write_json(rows: &[OutputRow], cli: &Cli) -> Result<()> {
    let s = serde_json::to_string_pretty(rows)?;
    if let Some(path) = &cli.out {
        write_all_atomically(path, s.as_bytes())?;
    } else {
        println!("{s}");
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_json(_: &[OutputRow], _: &Cli) -> Result<()> {
    bail!("format=json nécessite la feature 'with-serde'")
}

#[cfg(feature = "with-serde")]
fn write_ndjson(rows: &[OutputRow], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut buf = Vec::new();
        for row in rows {
            let line = serde_json::to_string(row)?;
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
        write_all_atomically(path, &buf)?;
    } else {
        for row in rows {
            println!("{}", serde_json::to_string(row)?);
        }
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_ndjson(_: &[OutputRow], _: &Cli) -> Result<()> {
    bail!("format=ndjson nécessite la feature 'with-serde'")
}

#[cfg(feature = "with-csv")]
fn write_csv(rows: &[OutputRow], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(CSV_HEADER)?;
        for row in rows {
            wtr.write_record(csv_record(row))?;
        }
        let data = wtr.into_inner()?;
        write_all_atomically(path, &data)?;
    } else {
        let mut wtr = csv::Writer::from_writer(std::io::stdout());
        wtr.write_record(CSV_HEADER)?;
        for row in rows {
            wtr.write_record(csv_record(row))?;
        }
        wtr.flush()?;
    }
    Ok(())
}

#[cfg(not(feature = "with-csv"))]
fn write_csv(_: &[OutputRow], _: &Cli) -> Result<()> {
    bail!("format=csv nécessite la feature 'with-csv'")
}

#[cfg(feature = "with-csv")]
const CSV_HEADER: [&str; 9] = [
    "sender",
    "domain",
    "client_ip",
    "helo",
    "result",
    "explanation",
    "problem",
    "dns_lookups",
    "void_lookups",
];

#[cfg(feature = "with-csv")]
fn csv_record(row: &OutputRow) -> Vec<String> {
    vec![
        row.sender.clone(),
        row.domain.clone(),
        row.client_ip.clone().unwrap_or_default(),
        row.helo.clone().unwrap_or_default(),
        row.result.as_str().to_string(),
        row.explanation.clone().unwrap_or_default(),
        row.problem.clone().unwrap_or_default(),
        row.dns_lookups.to_string(),
        row.void_lookups.to_string(),
    ]
}

/// Sortie de `parse` : human ou json uniquement.
pub fn write_record(record: &PolicyRecord, cli: &Cli) -> Result<()> {
    match cli.format.as_str() {
        "human" => {
            println!("[OK]    {record}");
            for term in record.terms() {
                match term {
                    Term::Directive(directive) => println!(
                        "        {:<10} {:<8} {}",
                        directive.mechanism.kind().name(),
                        directive.qualifier.result().as_str(),
                        directive.mechanism
                    ),
                    Term::Modifier(modifier) => println!("        modifier   {modifier}"),
                }
            }
            Ok(())
        }
        "json" => write_record_json(record, cli),
        other => bail!("unknown --format '{other}' for parse, use: human|json"),
    }
}

#[cfg(feature = "with-serde")]
fn write_record_json(record: &PolicyRecord, cli: &Cli) -> Result<()> {
    let s = serde_json::to_string_pretty(record)?;
    if let Some(path) = &cli.out {
        write_all_atomically(path, s.as_bytes())?;
    } else {
        println!("{s}");
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_record_json(_: &PolicyRecord, _: &Cli) -> Result<()> {
    bail!("format=json nécessite la feature 'with-serde'")
}

#[cfg(any(feature = "with-serde", feature = "with-csv"))]
fn write_all_atomically(path: &str, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let tmp = format!("{path}.tmp");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("rename {tmp} -> {path}"))?;
    Ok(())
}

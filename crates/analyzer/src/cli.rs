use std::fmt::Write as _;

use anyhow::{bail, Result};
use chrono::SecondsFormat;
use common::snapshot::LedgerSnapshot;
use common::source::LoadStatus;
use common::types::TransactionRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run,
    Summary,
    /// `None` reports on the most active address.
    Address {
        address: Option<String>,
    },
    TopRisk,
    Correlation,
    Tx {
        id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub command: Command,
    pub format: Format,
}

pub fn parse_args<I>(args: I) -> std::result::Result<Cli, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0]; `--json` may appear anywhere.
    let mut format = Format::Text;
    let mut rest = Vec::new();
    for arg in args.skip(1) {
        if arg == "--json" {
            format = Format::Json;
        } else {
            rest.push(arg);
        }
    }
    let mut rest = rest.into_iter();

    let Some(cmd) = rest.next() else {
        return Ok(Cli {
            command: Command::Run,
            format,
        });
    };

    let command = match cmd.as_str() {
        "run" => Command::Run,
        "summary" => Command::Summary,
        "address" => Command::Address {
            address: rest.next(),
        },
        "top-risk" => Command::TopRisk,
        "correlation" => Command::Correlation,
        "tx" => {
            let id = rest
                .next()
                .ok_or_else(|| "usage: analyzer tx <tx_id|tx_hash>".to_string())?;
            Command::Tx { id }
        }
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(Cli { command, format })
}

pub fn run_command(snapshot: &LedgerSnapshot, cli: &Cli) -> Result<()> {
    let out = render(snapshot, cli)?;
    if !out.is_empty() {
        println!("{out}");
    }
    Ok(())
}

pub fn render(snapshot: &LedgerSnapshot, cli: &Cli) -> Result<String> {
    let json = cli.format == Format::Json;
    match &cli.command {
        Command::Run => Ok(String::new()),
        Command::Summary if json => Ok(serde_json::to_string_pretty(&snapshot.summary)?),
        Command::Summary => render_summary(snapshot),
        Command::Address { address } => {
            let report = match address {
                Some(a) => snapshot.address(a),
                None => snapshot.primary(),
            };
            let Some(report) = report else {
                bail!(
                    "address not found: {}",
                    address.as_deref().unwrap_or("(ledger has no addresses)")
                );
            };
            if json {
                return Ok(serde_json::to_string_pretty(&report)?);
            }
            render_address(&report)
        }
        Command::TopRisk if json => Ok(serde_json::to_string_pretty(&snapshot.top_risk())?),
        Command::TopRisk => render_top_risk(&snapshot.top_risk()),
        Command::Correlation if json => Ok(serde_json::to_string_pretty(&snapshot.correlation)?),
        Command::Correlation => render_correlation(snapshot),
        Command::Tx { id } => {
            let Some(detail) = snapshot.transaction(id) else {
                bail!("transaction not found: {id}");
            };
            if json {
                return Ok(serde_json::to_string_pretty(&detail)?);
            }
            render_transaction(&detail)
        }
    }
}

fn status_line(snapshot: &LedgerSnapshot) -> String {
    match &snapshot.status {
        LoadStatus::Loaded => format!(
            "Ledger: loaded ({} rows, {} flagged) at {}",
            snapshot.records().len(),
            snapshot.ledger.flagged_rows(),
            snapshot.built_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        LoadStatus::Empty => "Ledger: empty (no data rows)".to_string(),
        LoadStatus::Unavailable { reason } => format!("Ledger: unavailable ({reason})"),
    }
}

fn render_summary(snapshot: &LedgerSnapshot) -> Result<String> {
    let s = &snapshot.summary;
    let mut out = String::new();
    writeln!(out, "{}", status_line(snapshot))?;
    writeln!(out, "Transactions:     {}", s.total_transactions)?;
    writeln!(out, "Active addresses: {}", s.active_addresses)?;
    writeln!(out, "Risk alerts:      {}", s.risk_alerts)?;
    writeln!(out, "Total volume:     {}", s.total_volume)?;

    writeln!(out, "Risk distribution:")?;
    for share in &s.risk_distribution {
        writeln!(
            out,
            "  {:<8} {:>6}  {:>5.1}%",
            share.category, share.count, share.percentage
        )?;
    }

    writeln!(out, "Size buckets:")?;
    for b in &s.size_buckets {
        writeln!(out, "  {:<20} {:>6}", b.label, b.count)?;
    }

    writeln!(out, "Script types:")?;
    for t in &s.script_types {
        writeln!(out, "  {:<20} {:>6}", t.script_type, t.count)?;
    }

    writeln!(out, "Top addresses by net flow:")?;
    for f in &s.top_addresses {
        writeln!(out, "  {:>16}  {}", f.value, f.address)?;
    }

    let activity = snapshot.recent_activity();
    if !activity.is_empty() {
        writeln!(out, "Recent high-risk activity:")?;
        for e in activity {
            writeln!(
                out,
                "  {:<18}  {}  value={}",
                e.kind.as_str(),
                e.record.display_id(),
                fmt_opt(e.record.value)
            )?;
        }
    }
    Ok(out.trim_end().to_string())
}

fn render_address(report: &common::snapshot::AddressReport<'_>) -> Result<String> {
    let p = report.profile;
    let mut out = String::new();
    writeln!(out, "Address: {}", p.address)?;
    writeln!(out, "  transactions={}", p.transaction_count)?;
    writeln!(
        out,
        "  received={}  sent={}  balance={}",
        p.total_received, p.total_sent, p.balance
    )?;
    writeln!(
        out,
        "  risk={} score={:.2} band={:?}",
        p.risk_category, p.risk_score, report.band
    )?;
    if let Some(entity) = &p.entity {
        let category = entity.category.as_str();
        writeln!(out, "  entity={} ({category})", entity.name)?;
    }
    if !p.tags.is_empty() {
        let tags: Vec<&str> = p.tags.iter().map(|t| t.name).collect();
        writeln!(out, "  tags={}", tags.join(","))?;
    }
    writeln!(out, "  connected={}", p.connected_addresses.len())?;

    writeln!(out, "Recent transactions:")?;
    for e in &report.recent {
        writeln!(
            out,
            "  {:<8}  {}  value={}",
            e.direction.as_str(),
            e.record.display_id(),
            fmt_opt(e.record.value)
        )?;
    }
    Ok(out.trim_end().to_string())
}

fn render_top_risk(records: &[&TransactionRecord]) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "Top transactions by risk:")?;
    for (rank, r) in records.iter().enumerate() {
        writeln!(
            out,
            "{:>3}  {:>5.2}  {}  {} -> {}  value={}",
            rank + 1,
            r.high_risk_score,
            r.display_id(),
            r.sender_address.as_deref().unwrap_or("-"),
            r.receiver_address.as_deref().unwrap_or("-"),
            fmt_opt(r.value)
        )?;
    }
    Ok(out.trim_end().to_string())
}

fn render_correlation(snapshot: &LedgerSnapshot) -> Result<String> {
    let m = &snapshot.correlation;
    let mut out = String::new();
    write!(out, "{:>8}", "")?;
    for f in &m.fields {
        write!(out, "{:>8}", f.as_str())?;
    }
    writeln!(out)?;
    for a in &m.fields {
        write!(out, "{:>8}", a.as_str())?;
        for b in &m.fields {
            write!(out, "{:>8.2}", m.get(*a, *b).unwrap_or(0.0))?;
        }
        writeln!(out)?;
    }
    Ok(out.trim_end().to_string())
}

fn render_transaction(detail: &common::snapshot::TransactionDetail<'_>) -> Result<String> {
    let r = detail.record;
    let mut out = String::new();
    writeln!(out, "Transaction: {}", r.display_id())?;
    if let Some(hash) = &r.tx_hash {
        writeln!(out, "  hash={hash}")?;
    }
    writeln!(
        out,
        "  {} -> {}",
        r.sender_address.as_deref().unwrap_or("-"),
        r.receiver_address.as_deref().unwrap_or("-")
    )?;
    writeln!(
        out,
        "  value={}  fee={}  size={}",
        fmt_opt(r.value),
        fmt_opt(r.fee),
        fmt_opt(r.size)
    )?;
    writeln!(
        out,
        "  risk={} score={:.2} band={:?}",
        detail.assessment.category, detail.assessment.score, detail.band
    )?;
    for i in &detail.indicators {
        writeln!(
            out,
            "  indicator {:<16} {:<6} {:.2}  {}",
            i.kind, i.severity, i.confidence, i.description
        )?;
    }
    for issue in &r.issues {
        writeln!(out, "  unparsed {}={:?}", issue.column, issue.raw)?;
    }
    Ok(out.trim_end().to_string())
}

fn fmt_opt<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::AggregationConfig;
    use common::source::LedgerLoad;

    const LEDGER: &str = "tx_id,tx_hash,sender_address,receiver_address,value,fee,size,High_Risk,Medium_Risk,high_value_tx\n\
t1,h1,A,B,5,0.1,300,0,1,0\n\
t2,h2,B,C,3,0.2,1200,1,0,1\n\
t3,h3,C,UNKNOWN,1,abc,200,0,0,0\n\
t4,h4,B,D,2,0.1,400,0,0,0\n";

    fn snapshot() -> LedgerSnapshot {
        LedgerSnapshot::build(LedgerLoad::from_text(LEDGER), &AggregationConfig::default())
    }

    fn args(v: &[&str]) -> std::vec::IntoIter<String> {
        std::iter::once("analyzer")
            .chain(v.iter().copied())
            .map(String::from)
            .collect::<Vec<_>>()
            .into_iter()
    }

    fn cli(command: Command) -> Cli {
        Cli {
            command,
            format: Format::Text,
        }
    }

    #[test]
    fn test_parse_args_defaults_to_run() {
        let parsed = parse_args(args(&[])).unwrap();
        assert_eq!(parsed.command, Command::Run);
        assert_eq!(parsed.format, Format::Text);
    }

    #[test]
    fn test_parse_address_command() {
        let parsed = parse_args(args(&["address", "bc1qxyz"])).unwrap();
        assert_eq!(
            parsed.command,
            Command::Address {
                address: Some("bc1qxyz".to_string())
            }
        );
        let parsed = parse_args(args(&["address"])).unwrap();
        assert_eq!(parsed.command, Command::Address { address: None });
    }

    #[test]
    fn test_parse_json_flag_anywhere() {
        let parsed = parse_args(args(&["--json", "tx", "t1"])).unwrap();
        assert_eq!(parsed.format, Format::Json);
        assert_eq!(
            parsed.command,
            Command::Tx {
                id: "t1".to_string()
            }
        );
        let parsed = parse_args(args(&["top-risk", "--json"])).unwrap();
        assert_eq!(parsed.command, Command::TopRisk);
        assert_eq!(parsed.format, Format::Json);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(args(&["tx"])).is_err());
        assert_eq!(
            parse_args(args(&["bogus"])).unwrap_err(),
            "unknown command: bogus"
        );
    }

    #[test]
    fn test_render_summary() {
        let out = render(&snapshot(), &cli(Command::Summary)).unwrap();
        assert!(out.starts_with("Ledger: loaded (4 rows, 1 flagged)"));
        assert!(out.contains("Risk alerts:      1"));
        assert!(out.contains("Total volume:     11"));
        assert!(out.contains("Large Value"));
    }

    #[test]
    fn test_render_address_defaults_to_primary() {
        let out = render(&snapshot(), &cli(Command::Address { address: None })).unwrap();
        assert!(out.starts_with("Address: B"));
        assert!(out.contains("transactions=3"));
        assert!(out.contains("outbound  t2"));
    }

    #[test]
    fn test_render_unknown_address_is_error() {
        let err = render(
            &snapshot(),
            &cli(Command::Address {
                address: Some("Z".to_string()),
            }),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "address not found: Z");
    }

    #[test]
    fn test_render_top_risk_order() {
        let out = render(&snapshot(), &cli(Command::TopRisk)).unwrap();
        let first = out.lines().nth(1).unwrap();
        assert!(first.contains("t2"), "{first}");
    }

    #[test]
    fn test_render_transaction_by_hash() {
        let out = render(
            &snapshot(),
            &cli(Command::Tx {
                id: "h3".to_string(),
            }),
        )
        .unwrap();
        assert!(out.starts_with("Transaction: t3"));
        assert!(out.contains("unparsed fee=\"abc\""));
    }

    #[test]
    fn test_render_json_correlation() {
        let parsed = Cli {
            command: Command::Correlation,
            format: Format::Json,
        };
        let out = render(&snapshot(), &parsed).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["fields"].as_array().unwrap().len(), 5);
        assert_eq!(v["cells"].as_array().unwrap().len(), 25);
    }

    #[test]
    fn test_render_correlation_grid() {
        let out = render(&snapshot(), &cli(Command::Correlation)).unwrap();
        assert_eq!(out.lines().count(), 6);
        assert!(out.lines().next().unwrap().contains("weight"));
    }

    #[test]
    fn test_render_unavailable_summary() {
        let snap = LedgerSnapshot::build(
            LedgerLoad::unavailable(&common::source::SourceError::Status {
                url: "http://ledger".to_string(),
                status: 404,
            }),
            &AggregationConfig::default(),
        );
        let out = render(&snap, &cli(Command::Summary)).unwrap();
        assert!(out.starts_with("Ledger: unavailable (fetching http://ledger: HTTP 404)"));
        assert!(out.contains("Transactions:     0"));
    }
}

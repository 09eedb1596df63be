use anyhow::{Context, Result};
use serde_json::json;
use std::env;
use std::fs;
use std::path::PathBuf;

use executions_parser::parse_executions;
use journal_engine::build_journal;

fn main() -> Result<()> {
    // Usage:
    //   generate-journal <executions_csv> [output_json]

    let args: Vec<String> = env::args().collect();
    let Some(csv_path) = args.get(1).map(PathBuf::from) else {
        anyhow::bail!("Please provide a trade-execution export as the first argument.");
    };
    let out_path = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| csv_path.with_extension("journal.json"));

    println!("📖 Parsing trade executions: {}", csv_path.display());

    let input = fs::read_to_string(&csv_path)
        .with_context(|| format!("Cannot open {}", csv_path.display()))?;
    let parsed = parse_executions(&input).context("parse executions")?;

    println!(
        "✓ Parsed: {} executions ({} rows skipped)",
        parsed.executions.len(),
        parsed.skipped.len()
    );

    let journal = build_journal(parsed.executions);

    if journal.days.is_empty() {
        println!("❌ No round-trip trades matched.");
    }
    for (date, day) in &journal.days {
        println!(
            "  {} | {} trades | fees {:.2} | net {:.2}",
            date,
            day.trades.len(),
            day.fees,
            day.total
        );
    }
    for symbol in journal.open_lots.open_symbols() {
        println!(
            "  still open: {} long {:.2} / short {:.2}",
            symbol,
            journal.open_lots.long_quantity(symbol),
            journal.open_lots.short_quantity(symbol)
        );
    }

    let open: Vec<_> = journal
        .open_lots
        .open_symbols()
        .into_iter()
        .map(|s| {
            json!({
                "symbol": s,
                "long": journal.open_lots.long_quantity(s),
                "short": journal.open_lots.short_quantity(s),
            })
        })
        .collect();
    let output = json!({
        "days": journal.days,
        "open_lots": open,
        "skipped": parsed.skipped,
    });

    fs::write(&out_path, serde_json::to_string_pretty(&output)?)
        .with_context(|| format!("Cannot write {}", out_path.display()))?;

    println!("✅ Journal written to: {}", out_path.display());
    Ok(())
}

use anyhow::{Context, Result};
use serde_json::json;
use std::collections::BTreeMap;
use std::{env, fs, path::PathBuf};

use activity_statement_parser::parse_statement;

fn find_csv_file() -> Option<PathBuf> {
    let current_dir = env::current_dir().ok()?;
    let entries = fs::read_dir(&current_dir).ok()?;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("csv") {
            return Some(path);
        }
    }
    None
}

fn main() -> Result<()> {
    // Usage:
    //   activity_statement_parser [statement_csv] [rates_json] [output_json]
    //
    // If statement_csv is not provided, the first .csv file in the current
    // directory is used. rates_json optionally seeds the exchange-rate map.

    let args: Vec<String> = env::args().collect();

    let csv_path = if let Some(arg) = args.get(1) {
        PathBuf::from(arg)
    } else if let Some(found) = find_csv_file() {
        found
    } else {
        anyhow::bail!("No CSV file found in current directory. Please provide a statement file path as the first argument.");
    };

    let prior_rates: BTreeMap<String, f64> = match args.get(2) {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Cannot open rates file {}", path))?;
            serde_json::from_str(&content).with_context(|| format!("Bad rates JSON in {}", path))?
        }
        None => BTreeMap::new(),
    };

    println!("📖 Parsing activity statement: {}", csv_path.display());

    let input = fs::read_to_string(&csv_path)
        .with_context(|| format!("Cannot open {}", csv_path.display()))?;
    let parsed = parse_statement(&input, &prior_rates)?;
    let snapshot = &parsed.snapshot;

    println!(
        "✓ Parsed: {} positions, {} cash currencies, {} rates ({} rows skipped)",
        snapshot.positions.len(),
        snapshot.cash.len(),
        snapshot.rates.len(),
        parsed.skipped.len()
    );
    println!(
        "✓ Totals: value {:.2} USD, unrealized {:.2}, realized {:.2}, dividends {:.2}, withholding {:.2}",
        snapshot.total_value,
        snapshot.total_unrealized,
        snapshot.total_realized,
        snapshot.total_dividends,
        snapshot.total_withholding_tax
    );

    let output = json!({
        "snapshot": snapshot,
        "cash": snapshot.cash_amounts(),
        "skipped": parsed.skipped,
    });

    let out_path = args
        .get(3)
        .map(PathBuf::from)
        .unwrap_or_else(|| csv_path.with_extension("snapshot.json"));
    fs::write(&out_path, serde_json::to_string_pretty(&output)?)
        .with_context(|| format!("Cannot write {}", out_path.display()))?;

    println!("✅ Snapshot written to: {}", out_path.display());
    Ok(())
}

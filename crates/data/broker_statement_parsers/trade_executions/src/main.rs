use anyhow::{Context, Result};
use serde_json::json;
use std::{env, fs, path::PathBuf};

use executions_parser::parse_executions;

fn main() -> Result<()> {
    // Usage:
    //   executions_parser <executions_csv> [output_json]

    let args: Vec<String> = env::args().collect();
    let Some(csv_path) = args.get(1).map(PathBuf::from) else {
        anyhow::bail!("Please provide a trade-execution export as the first argument.");
    };

    println!("📖 Parsing trade executions: {}", csv_path.display());

    let input = fs::read_to_string(&csv_path)
        .with_context(|| format!("Cannot open {}", csv_path.display()))?;
    let parsed = parse_executions(&input)?;

    if parsed.executions.is_empty() {
        println!("❌ Nothing parsed ({} rows skipped).", parsed.skipped.len());
        return Ok(());
    }

    println!(
        "✓ Parsed: {} executions ({} rows skipped)",
        parsed.executions.len(),
        parsed.skipped.len()
    );

    let output = json!({
        "executions": parsed.executions,
        "skipped": parsed.skipped,
    });

    let out_path = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| csv_path.with_extension("executions.json"));
    fs::write(&out_path, serde_json::to_string_pretty(&output)?)
        .with_context(|| format!("Cannot write {}", out_path.display()))?;

    println!("✅ Executions written to: {}", out_path.display());
    Ok(())
}

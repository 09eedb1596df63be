use chrono::{NaiveDate, NaiveDateTime};

use models::{Execution, Side};
use utils::{split_row, ColumnMap, ParseError, SkippedRow};

pub const PARSER_NAME: &str = "trade_executions";

const EXECUTION_FIELDS: &[(&str, &[&str])] = &[
    ("symbol", &["symbol", "underlying", "instrument", "basiswert"]),
    ("description", &["description", "contract", "beschreibung"]),
    ("side", &["side", "action", "buy/sell", "aktion"]),
    ("quantity", &["quantity", "qty", "menge"]),
    ("price", &["t. price", "price", "kurs"]),
    ("time", &["date/time", "time", "datum", "date"]),
    ("commission", &["comm", "commission", "provision"]),
    ("net_amount", &["net amount", "nettobetrag"]),
    ("realized_pnl", &["realized p/l", "fifo p/l realized", "realisierter g&v"]),
];

/// Contract inference table, evaluated top to bottom: the micro variants sit
/// above their standard counterparts so "Micro E-mini S&P 500" never falls
/// through to ES, and the MES symbol prefix is tried before ES. Adding a
/// contract type is a row here, not code.
struct ContractSpec {
    /// Lower-cased contains-match against the contract description.
    keyword: &'static str,
    /// Prefix match against the raw symbol token (month-year code follows).
    prefix: &'static str,
    symbol: &'static str,
    multiplier: f64,
}

const CONTRACT_SPECS: &[ContractSpec] = &[
    ContractSpec { keyword: "micro e-mini s&p", prefix: "MES", symbol: "MES", multiplier: 5.0 },
    ContractSpec { keyword: "micro e-mini nasdaq", prefix: "MNQ", symbol: "MNQ", multiplier: 2.0 },
    ContractSpec { keyword: "micro e-mini dow", prefix: "MYM", symbol: "MYM", multiplier: 0.5 },
    ContractSpec { keyword: "micro e-mini russell", prefix: "M2K", symbol: "M2K", multiplier: 5.0 },
    ContractSpec { keyword: "micro gold", prefix: "MGC", symbol: "MGC", multiplier: 10.0 },
    ContractSpec { keyword: "micro wti", prefix: "MCL", symbol: "MCL", multiplier: 100.0 },
    ContractSpec { keyword: "e-mini s&p", prefix: "ES", symbol: "ES", multiplier: 50.0 },
    ContractSpec { keyword: "e-mini nasdaq", prefix: "NQ", symbol: "NQ", multiplier: 20.0 },
    ContractSpec { keyword: "e-mini dow", prefix: "YM", symbol: "YM", multiplier: 5.0 },
    ContractSpec { keyword: "e-mini russell", prefix: "RTY", symbol: "RTY", multiplier: 50.0 },
    ContractSpec { keyword: "gold", prefix: "GC", symbol: "GC", multiplier: 100.0 },
    ContractSpec { keyword: "crude oil", prefix: "CL", symbol: "CL", multiplier: 1000.0 },
];

#[derive(Debug)]
pub struct ParsedExecutions {
    pub executions: Vec<Execution>,
    pub skipped: Vec<SkippedRow>,
}

/// Parses a flat trade-execution export into a stream of typed fills.
///
/// The first non-empty line is the header. Symbol, side, price and time are
/// structurally required: if any of them cannot be resolved the whole parse
/// fails with no partial data, rather than guessing at financial output.
/// Everything else (quantity, commission, realized PnL) degrades to zero,
/// and malformed rows are skipped with a recorded reason.
pub fn parse_executions(input: &str) -> Result<ParsedExecutions, ParseError> {
    let lines: Vec<&str> = input.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 2 {
        return Err(ParseError::EmptyInput);
    }

    let header = split_row(lines[0]);
    let map = ColumnMap::resolve(&header, EXECUTION_FIELDS);

    let mut required = map.missing(&["side", "price", "time"]);
    if !map.has("symbol") && !map.has("description") {
        required.insert(0, "symbol");
    }
    if !required.is_empty() {
        return Err(ParseError::MissingColumns(required.join(", ")));
    }

    let mut executions = Vec::new();
    let mut skipped = Vec::new();

    for (idx, line) in lines.iter().enumerate().skip(1) {
        let line_no = idx + 1;
        let row = split_row(line);

        let raw_symbol = map.text(&row, "symbol");
        let description = {
            let d = map.text(&row, "description");
            if d.is_empty() { raw_symbol.clone() } else { d }
        };
        if raw_symbol.is_empty() && description.is_empty() {
            skipped.push(SkippedRow::new(line_no, "row without instrument"));
            continue;
        }

        let Some(side) = Side::from_label(&map.text(&row, "side")) else {
            skipped.push(SkippedRow::new(
                line_no,
                format!("unrecognized side '{}'", map.text(&row, "side")),
            ));
            continue;
        };

        let Some(timestamp) = parse_timestamp(&map.text(&row, "time")) else {
            skipped.push(SkippedRow::new(
                line_no,
                format!("unparseable timestamp '{}'", map.text(&row, "time")),
            ));
            continue;
        };

        let quantity = map.number(&row, "quantity").abs();
        if quantity == 0.0 {
            skipped.push(SkippedRow::new(line_no, "zero quantity"));
            continue;
        }

        let (symbol, multiplier) = infer_contract(&raw_symbol, &description);

        executions.push(Execution {
            symbol,
            contract_description: description,
            side,
            quantity,
            price: map.number(&row, "price"),
            timestamp,
            commission: map.number(&row, "commission").abs(),
            multiplier,
            broker_reported_pnl: map.number(&row, "realized_pnl"),
        });
    }

    Ok(ParsedExecutions { executions, skipped })
}

/// Canonical symbol and per-point contract multiplier for a fill, from its
/// raw symbol token and free-text description. Falls back to the first
/// whitespace token of the instrument text with a multiplier of 1.0
/// (stocks and anything else the table does not know).
pub fn infer_contract(raw_symbol: &str, description: &str) -> (String, f64) {
    let desc = description.to_lowercase();
    let token = raw_symbol.trim().to_uppercase();

    for spec in CONTRACT_SPECS {
        if desc.contains(spec.keyword) || has_futures_prefix(&token, spec.prefix) {
            return (spec.symbol.to_string(), spec.multiplier);
        }
    }

    let fallback = if token.is_empty() { description } else { raw_symbol };
    let symbol = fallback
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_uppercase();
    (symbol, 1.0)
}

/// True when `token` is `prefix` plus a futures month-year code ("MESM4",
/// "ESZ2024"), so stock tickers that merely share the letters ("CLF") are
/// not claimed.
fn has_futures_prefix(token: &str, prefix: &str) -> bool {
    let Some(rest) = token.strip_prefix(prefix) else {
        return false;
    };
    let mut chars = rest.chars();
    let Some(month) = chars.next() else {
        return false;
    };
    "FGHJKMNQUVXZ".contains(month) && chars.clone().count() >= 1 && chars.all(|c| c.is_ascii_digit())
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let t = s.trim().trim_matches('"');
    for fmt in [
        "%Y-%m-%d, %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%m/%d/%Y, %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(dt);
        }
    }
    // Date-only rows get midnight so same-day ordering still holds.
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Symbol,Description,Buy/Sell,Quantity,T. Price,Date/Time,Comm/Fee,Realized P/L";

    fn parse(rows: &[&str]) -> ParsedExecutions {
        let input = format!("{}\n{}", HEADER, rows.join("\n"));
        parse_executions(&input).expect("executions should parse")
    }

    #[test]
    fn basic_fill_row() {
        let parsed = parse(&["MESM4,Micro E-mini S&P 500,BUY,2,5300.25,\"2024-06-03, 09:31:12\",1.24,0"]);
        assert_eq!(parsed.executions.len(), 1);
        let e = &parsed.executions[0];
        assert_eq!(e.symbol, "MES");
        assert_eq!(e.side, Side::Buy);
        assert_eq!(e.quantity, 2.0);
        assert_eq!(e.price, 5300.25);
        assert_eq!(e.multiplier, 5.0);
        assert_eq!(e.commission, 1.24);
        assert_eq!(e.timestamp.to_string(), "2024-06-03 09:31:12");
    }

    #[test]
    fn micro_wins_over_standard() {
        assert_eq!(infer_contract("", "Micro E-mini S&P 500 Jun24"), ("MES".to_string(), 5.0));
        assert_eq!(infer_contract("", "E-mini S&P 500 Jun24"), ("ES".to_string(), 50.0));
        assert_eq!(infer_contract("MESM4", ""), ("MES".to_string(), 5.0));
        assert_eq!(infer_contract("ESM4", ""), ("ES".to_string(), 50.0));
    }

    #[test]
    fn stock_ticker_is_not_a_future() {
        // CLF is a stock even though it starts with the crude-oil root.
        assert_eq!(infer_contract("CLF", "CLEVELAND-CLIFFS INC"), ("CLF".to_string(), 1.0));
        assert_eq!(infer_contract("CLM4", "Crude Oil Jun24"), ("CL".to_string(), 1000.0));
    }

    #[test]
    fn unknown_instrument_falls_back_to_first_token() {
        let (symbol, multiplier) = infer_contract("AAPL", "APPLE INC");
        assert_eq!(symbol, "AAPL");
        assert_eq!(multiplier, 1.0);
    }

    #[test]
    fn missing_structural_column_is_a_hard_failure() {
        let input = "Symbol,Quantity,T. Price,Date/Time\nMESM4,2,5300.25,2024-06-03";
        match parse_executions(input) {
            Err(ParseError::MissingColumns(cols)) => assert!(cols.contains("side")),
            other => panic!("expected MissingColumns, got {:?}", other.map(|p| p.executions)),
        }
    }

    #[test]
    fn malformed_rows_are_skipped_with_reasons() {
        let parsed = parse(&[
            "MESM4,Micro E-mini S&P 500,BUY,2,5300.25,\"2024-06-03, 09:31:12\",1.24,0",
            "MESM4,Micro E-mini S&P 500,HOLD,2,5300.25,\"2024-06-03, 09:32:00\",1.24,0",
            "MESM4,Micro E-mini S&P 500,SELL,2,5310.25,not a time,1.24,0",
            "MESM4,Micro E-mini S&P 500,SELL,0,5310.25,\"2024-06-03, 09:33:00\",1.24,0",
        ]);
        assert_eq!(parsed.executions.len(), 1);
        assert_eq!(parsed.skipped.len(), 3);
        assert!(parsed.skipped[0].reason.contains("side"));
        assert!(parsed.skipped[1].reason.contains("timestamp"));
        assert!(parsed.skipped[2].reason.contains("quantity"));
    }

    #[test]
    fn negative_quantity_and_commission_are_normalized() {
        let parsed = parse(&["ESM4,E-mini S&P 500,SELL,-3,5310.00,\"2024-06-03, 10:05:00\",-2.10,125.5"]);
        let e = &parsed.executions[0];
        assert_eq!(e.quantity, 3.0);
        assert_eq!(e.commission, 2.10);
        assert_eq!(e.broker_reported_pnl, 125.5);
    }

    #[test]
    fn fifo_pnl_header_variant_resolves() {
        let input = "Symbol,Buy/Sell,Quantity,T. Price,Date/Time,Fifo P/L Realized\nESM4,SELL,1,5310.00,\"2024-06-03, 10:05:00\",250";
        let parsed = parse_executions(input).unwrap();
        assert_eq!(parsed.executions[0].broker_reported_pnl, 250.0);
    }

    #[test]
    fn too_short_input_is_a_hard_failure() {
        assert!(matches!(parse_executions(HEADER), Err(ParseError::EmptyInput)));
    }
}

use std::collections::BTreeMap;

use models::{PortfolioPosition, PortfolioSnapshot};
use utils::{split_row, ColumnMap, ParseError, SkippedRow};

pub const PARSER_NAME: &str = "activity_statement";

/// Sections this parser understands. Statement exports title them in either
/// German or English; anything else leaves the parser without an active
/// section until the next recognized header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    OpenPositions,
    RealizedPerformance,
    CashReport,
    ForexBalances,
    Dividends,
    WithholdingTax,
}

impl SectionKind {
    fn from_title(title: &str) -> Option<SectionKind> {
        let t = title.trim().to_lowercase();
        if t.contains("open positions") || t.contains("offene positionen") {
            Some(SectionKind::OpenPositions)
        } else if t.contains("performance summary")
            || t.contains("performance-übersicht")
            || t.contains("realized & unrealized")
            || t.contains("realisierte und unrealisierte")
        {
            Some(SectionKind::RealizedPerformance)
        } else if t.contains("cash report") || t.contains("cash-bericht") || t.contains("barmittelbericht") {
            Some(SectionKind::CashReport)
        } else if t.contains("forex balances") || t.contains("devisenguthaben") {
            Some(SectionKind::ForexBalances)
        } else if t.contains("withholding tax") || t.contains("quellensteuer") {
            Some(SectionKind::WithholdingTax)
        } else if t.contains("dividends") || t.contains("dividenden") {
            Some(SectionKind::Dividends)
        } else {
            None
        }
    }

    fn fields(&self) -> &'static [(&'static str, &'static [&'static str])] {
        match self {
            SectionKind::OpenPositions => POSITION_FIELDS,
            SectionKind::RealizedPerformance => REALIZED_FIELDS,
            SectionKind::CashReport => CASH_FIELDS,
            SectionKind::ForexBalances => FOREX_FIELDS,
            SectionKind::Dividends | SectionKind::WithholdingTax => INCOME_FIELDS,
        }
    }
}

const POSITION_FIELDS: &[(&str, &[&str])] = &[
    ("symbol", &["symbol"]),
    ("description", &["description", "beschreibung"]),
    ("asset_class", &["asset category", "asset class", "vermögenswertkategorie", "finanzinstrument"]),
    ("currency", &["currency", "währung"]),
    ("quantity", &["quantity", "menge", "anzahl"]),
    ("close_price", &["close price", "schlusskurs"]),
    ("value", &["value", "wert"]),
    ("unrealized", &["unrealized", "unrealisiert"]),
    ("cost_basis", &["cost basis", "kostenbasis", "einstandswert"]),
];

const REALIZED_FIELDS: &[(&str, &[&str])] = &[
    ("symbol", &["symbol"]),
    ("description", &["description", "beschreibung"]),
    ("asset_class", &["asset category", "asset class", "vermögenswertkategorie", "finanzinstrument"]),
    ("currency", &["currency", "währung"]),
    ("realized_total", &["realized total", "realisiert gesamt", "realisiert summe"]),
    ("realized_st", &["s/t", "short-term", "kurzfristig"]),
    ("realized_lt", &["l/t", "long-term", "langfristig"]),
];

const CASH_FIELDS: &[(&str, &[&str])] = &[
    ("summary", &["currency summary", "summary", "zusammenfassung", "beschreibung", "description"]),
    ("total", &["total", "gesamt"]),
];

const FOREX_FIELDS: &[(&str, &[&str])] = &[
    ("description", &["description", "beschreibung"]),
    ("close_price", &["close price", "schlusskurs"]),
];

const INCOME_FIELDS: &[(&str, &[&str])] = &[
    ("description", &["description", "beschreibung"]),
    ("amount", &["amount", "betrag"]),
];

/// Phrasings that mark a cash-report row as an ending balance.
const ENDING_BALANCE_PHRASES: &[&str] = &["ending cash", "schlusssaldo", "endsaldo"];

/// Instrument classes the portfolio sections ignore.
const ASSET_DENY: &[&str] = &["future", "option", "warrant", "optionsschein"];
/// Classes the open-position and realized sections accept when the
/// asset-class column is populated.
const ASSET_ALLOW: &[&str] = &["stock", "etf", "fund", "aktien", "fonds"];

#[derive(Debug)]
pub struct ParsedStatement {
    pub snapshot: PortfolioSnapshot,
    pub skipped: Vec<SkippedRow>,
}

/// Walks a multi-section activity statement and builds a portfolio snapshot.
///
/// Every line's second field is either "Header" (re-keys the active section
/// and its column layout from the remaining fields) or "Data" (dispatched to
/// the active section's handler). Rows that fit neither shape are recorded
/// as skipped, never fatal. `prior_rates` seed the snapshot's exchange-rate
/// map; a freshly parsed forex row overwrites its entry.
pub fn parse_statement(
    input: &str,
    prior_rates: &BTreeMap<String, f64>,
) -> Result<ParsedStatement, ParseError> {
    let lines: Vec<&str> = input.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 2 {
        return Err(ParseError::EmptyInput);
    }

    let mut snapshot = PortfolioSnapshot::default();
    snapshot.rates = prior_rates.clone();
    let mut skipped: Vec<SkippedRow> = Vec::new();
    let mut active: Option<(SectionKind, ColumnMap)> = None;

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let tokens = split_row(line);
        if tokens.len() < 2 {
            skipped.push(SkippedRow::new(line_no, "too few fields"));
            continue;
        }

        match tokens[1].as_str() {
            "Header" => {
                let title = tokens[0].as_str();
                match SectionKind::from_title(title) {
                    Some(kind) => {
                        let map = ColumnMap::resolve(&tokens[2..], kind.fields());
                        active = Some((kind, map));
                    }
                    None => {
                        active = None;
                        skipped.push(SkippedRow::new(
                            line_no,
                            format!("unrecognized section '{}'", title.trim()),
                        ));
                    }
                }
            }
            "Data" => {
                let Some((kind, map)) = active.as_ref() else {
                    skipped.push(SkippedRow::new(line_no, "data row before any section header"));
                    continue;
                };
                let row = &tokens[2..];
                let outcome = match kind {
                    SectionKind::OpenPositions => handle_open_position(&mut snapshot, map, row),
                    SectionKind::RealizedPerformance => handle_realized(&mut snapshot, map, row),
                    SectionKind::CashReport => handle_cash(&mut snapshot, map, row),
                    SectionKind::ForexBalances => handle_forex(&mut snapshot, map, row),
                    SectionKind::Dividends | SectionKind::WithholdingTax => {
                        handle_income(&mut snapshot, map, row)
                    }
                };
                if let Err(reason) = outcome {
                    skipped.push(SkippedRow::new(line_no, reason));
                }
            }
            other => {
                skipped.push(SkippedRow::new(
                    line_no,
                    format!("unknown row marker '{}'", other),
                ));
            }
        }
    }

    snapshot.recompute_totals();
    Ok(ParsedStatement { snapshot, skipped })
}

/// Deny-list check on asset class and description, allow-list check on a
/// populated asset class. A blank asset class passes as long as the
/// description is clean.
fn instrument_allowed(asset_class: &str, description: &str) -> bool {
    let class = asset_class.to_lowercase();
    let desc = description.to_lowercase();
    if ASSET_DENY.iter().any(|d| class.contains(d) || desc.contains(d)) {
        return false;
    }
    if !class.is_empty() && !ASSET_ALLOW.iter().any(|a| class.contains(a)) {
        return false;
    }
    true
}

fn position_entry<'a>(
    snapshot: &'a mut PortfolioSnapshot,
    symbol: &str,
) -> &'a mut PortfolioPosition {
    snapshot
        .positions
        .entry(symbol.to_string())
        .or_insert_with(|| PortfolioPosition {
            symbol: symbol.to_string(),
            ..Default::default()
        })
}

fn handle_open_position(
    snapshot: &mut PortfolioSnapshot,
    map: &ColumnMap,
    row: &[String],
) -> Result<(), String> {
    let symbol = map.text(row, "symbol");
    if symbol.is_empty() {
        return Err("open position row without symbol".to_string());
    }
    let asset_class = map.text(row, "asset_class");
    let description = map.text(row, "description");
    if !instrument_allowed(&asset_class, &description) {
        return Err(format!("excluded instrument class for '{}'", symbol));
    }

    let currency = map.text(row, "currency");
    let quantity = map.number(row, "quantity");
    let close_price = map.number(row, "close_price");
    let value = map.number(row, "value");
    let unrealized = map.number(row, "unrealized");
    let cost_basis = map.number(row, "cost_basis");

    let pos = position_entry(snapshot, &symbol);
    pos.quantity = quantity;
    pos.close_price = close_price;
    pos.market_value = value;
    pos.unrealized_pnl = unrealized;
    pos.cost_basis = cost_basis;
    if !currency.is_empty() {
        pos.currency = currency;
    }
    Ok(())
}

fn handle_realized(
    snapshot: &mut PortfolioSnapshot,
    map: &ColumnMap,
    row: &[String],
) -> Result<(), String> {
    let symbol = map.text(row, "symbol");
    if symbol.is_empty() {
        return Err("realized performance row without symbol".to_string());
    }
    let asset_class = map.text(row, "asset_class");
    let description = map.text(row, "description");
    if !instrument_allowed(&asset_class, &description) {
        return Err(format!("excluded instrument class for '{}'", symbol));
    }

    // A combined total column wins; otherwise the statement reports
    // short-term and long-term realized figures separately.
    let realized = if map.has("realized_total") {
        map.number(row, "realized_total")
    } else {
        map.number(row, "realized_st") + map.number(row, "realized_lt")
    };

    let currency = map.text(row, "currency");
    // Quantity stays at zero for a symbol only seen here: fully closed.
    let pos = position_entry(snapshot, &symbol);
    pos.realized_pnl = realized;
    if pos.currency.is_empty() && !currency.is_empty() {
        pos.currency = currency;
    }
    Ok(())
}

fn handle_cash(
    snapshot: &mut PortfolioSnapshot,
    map: &ColumnMap,
    row: &[String],
) -> Result<(), String> {
    let summary = map.text(row, "summary").to_lowercase();
    if !ENDING_BALANCE_PHRASES.iter().any(|p| summary.contains(p)) {
        return Err("not an ending balance row".to_string());
    }

    // The currency is wherever the row carries a bare three-letter code;
    // column layouts differ too much between export variants to resolve it
    // by header keyword.
    let Some(currency) = row.iter().map(|s| s.trim()).find(|s| is_currency_code(s)) else {
        return Err("ending balance row without currency code".to_string());
    };

    let amount = map.number(row, "total");
    if amount == 0.0 {
        return Err(format!("zero ending balance for {}", currency));
    }

    snapshot.cash.insert(currency.to_string(), amount);
    if currency != "USD" {
        // Seed a placeholder so consumers see that a rate is still needed.
        snapshot
            .rates
            .entry(format!("{}_USD", currency))
            .or_insert(0.0);
    }
    Ok(())
}

fn handle_forex(
    snapshot: &mut PortfolioSnapshot,
    map: &ColumnMap,
    row: &[String],
) -> Result<(), String> {
    let description = map.text(row, "description");
    let code = description.trim();
    if !is_currency_code(code) || code == "USD" {
        return Err(format!("not a foreign currency row: '{}'", description));
    }
    let close_price = map.number(row, "close_price");
    if close_price == 0.0 {
        return Err(format!("no close price for {}", code));
    }
    snapshot.rates.insert(format!("{}_USD", code), close_price);
    Ok(())
}

fn handle_income(
    snapshot: &mut PortfolioSnapshot,
    map: &ColumnMap,
    row: &[String],
) -> Result<(), String> {
    let description = map.text(row, "description").to_lowercase();
    let amount = map.number(row, "amount");
    if description.contains("withholding tax") || description.contains("quellensteuer") {
        snapshot.total_withholding_tax += amount.abs();
        Ok(())
    } else if description.contains("dividend") || description.contains("dividende") {
        if amount > 0.0 {
            snapshot.total_dividends += amount;
            Ok(())
        } else {
            Err("non-positive dividend amount".to_string())
        }
    } else {
        Err("neither dividend nor withholding tax".to_string())
    }
}

fn is_currency_code(s: &str) -> bool {
    s.len() == 3 && s.chars().all(|c| c.is_ascii_alphabetic() && c.is_ascii_uppercase())
}

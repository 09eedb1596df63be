use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An amount paired with its currency code. Nothing in the engine carries an
/// implicit currency context; wherever a number crosses an API boundary it
/// travels with its currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonetaryAmount {
    pub amount: f64,
    pub currency: String,
}

impl MonetaryAmount {
    pub fn new(amount: f64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Lenient constructor for the textual side values found in exports
    /// ("BUY", "Sell", "BOT", "SLD", ...).
    pub fn from_label(s: &str) -> Option<Side> {
        let t = s.trim().to_lowercase();
        if t.starts_with("buy") || t == "bot" || t == "b" {
            Some(Side::Buy)
        } else if t.starts_with("sell") || t.starts_with("sld") || t == "s" {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

/// One brokerage fill. Built once per parsed row, immutable afterwards; the
/// matcher consumes each execution exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub symbol: String,
    pub contract_description: String,
    pub side: Side,
    /// Always positive; direction is carried by `side`.
    pub quantity: f64,
    pub price: f64,
    pub timestamp: NaiveDateTime,
    /// Absolute value.
    pub commission: f64,
    pub multiplier: f64,
    /// 0.0 unless the export carried a realized-PnL column for this row.
    pub broker_reported_pnl: f64,
}

/// One matched round-trip: a closing fill (or part of one) against an earlier
/// opposite-side lot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub instrument: String,
    pub quantity: f64,
    pub pnl: f64,
    pub fee: f64,
    /// "Long-Cont." when a long position was closed, "Short-Cont." for a
    /// short cover.
    pub strategy: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

/// All trades closed on one calendar date, keyed by the closing execution's
/// ISO date.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DayEntry {
    pub date: String,
    pub trades: Vec<Trade>,
    pub fees: f64,
    /// Gross running PnL while matching; net of `fees` once the journal has
    /// been finalized.
    pub total: f64,
}

/// One held or fully closed instrument inside a statement period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioPosition {
    pub symbol: String,
    pub currency: String,
    /// 0.0 for a position that only appeared in the realized-performance
    /// section (fully closed during the period).
    pub quantity: f64,
    pub cost_basis: f64,
    pub close_price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
}

/// Everything a single activity statement reports for one period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub positions: BTreeMap<String, PortfolioPosition>,
    /// Currency code -> ending cash balance.
    pub cash: BTreeMap<String, f64>,
    /// "{CCY}_USD" -> rate. A 0.0 entry means the statement referenced the
    /// currency but supplied no rate.
    pub rates: BTreeMap<String, f64>,
    pub total_value: f64,
    pub total_unrealized: f64,
    pub total_realized: f64,
    pub total_dividends: f64,
    pub total_withholding_tax: f64,
}

impl PortfolioSnapshot {
    /// Recomputes the summary totals from the position and rate maps. This is
    /// the only place the totals are written: they are a deterministic
    /// function of the maps, never independently mutated.
    ///
    /// Market value and unrealized PnL are converted to USD through the rate
    /// map (USD passes through at 1.0, a missing rate counts as 0.0);
    /// realized PnL is already USD-reported and sums natively.
    pub fn recompute_totals(&mut self) {
        let mut value = 0.0;
        let mut unrealized = 0.0;
        let mut realized = 0.0;
        for pos in self.positions.values() {
            let rate = if pos.currency == "USD" {
                1.0
            } else {
                self.rates
                    .get(&format!("{}_USD", pos.currency))
                    .copied()
                    .unwrap_or(0.0)
            };
            value += pos.market_value * rate;
            unrealized += pos.unrealized_pnl * rate;
            realized += pos.realized_pnl;
        }
        self.total_value = value;
        self.total_unrealized = unrealized;
        self.total_realized = realized;
    }

    /// Cash balances as currency-tagged amounts, for JSON output.
    pub fn cash_amounts(&self) -> Vec<MonetaryAmount> {
        self.cash
            .iter()
            .map(|(ccy, amt)| MonetaryAmount::new(*amt, ccy.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(
        symbol: &str,
        currency: &str,
        value: f64,
        unrealized: f64,
        realized: f64,
    ) -> PortfolioPosition {
        PortfolioPosition {
            symbol: symbol.to_string(),
            currency: currency.to_string(),
            quantity: 1.0,
            market_value: value,
            unrealized_pnl: unrealized,
            realized_pnl: realized,
            ..Default::default()
        }
    }

    #[test]
    fn totals_convert_through_rate_map() {
        let mut snap = PortfolioSnapshot::default();
        snap.positions
            .insert("AAPL".to_string(), position("AAPL", "USD", 1000.0, 50.0, 10.0));
        snap.positions
            .insert("NESN".to_string(), position("NESN", "CHF", 2000.0, -100.0, 20.0));
        snap.rates.insert("CHF_USD".to_string(), 1.1);

        snap.recompute_totals();

        assert!((snap.total_value - (1000.0 + 2200.0)).abs() < 1e-9);
        assert!((snap.total_unrealized - (50.0 - 110.0)).abs() < 1e-9);
        assert!((snap.total_realized - 30.0).abs() < 1e-9);
    }

    #[test]
    fn missing_rate_counts_as_zero() {
        let mut snap = PortfolioSnapshot::default();
        snap.positions
            .insert("NOVN".to_string(), position("NOVN", "CHF", 5000.0, 100.0, 7.0));

        snap.recompute_totals();

        assert_eq!(snap.total_value, 0.0);
        assert_eq!(snap.total_unrealized, 0.0);
        // Realized is USD-reported already and ignores the rate map.
        assert_eq!(snap.total_realized, 7.0);
    }

    #[test]
    fn side_labels() {
        assert_eq!(Side::from_label("BUY"), Some(Side::Buy));
        assert_eq!(Side::from_label("Sell"), Some(Side::Sell));
        assert_eq!(Side::from_label("SLD"), Some(Side::Sell));
        assert_eq!(Side::from_label("hold"), None);
    }
}

use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap, VecDeque};

use models::{DayEntry, Execution, Side, Trade};

/// Residual quantity below which a lot counts as consumed. Repeated
/// proration leaves floating-point dust on the last match.
const QTY_EPSILON: f64 = 1e-9;

/// A remaining unmatched quantity from an earlier opening execution.
#[derive(Debug, Clone)]
struct OpenLot {
    price: f64,
    remaining: f64,
    /// The opening execution's full quantity; fee proration divides by this,
    /// not by what is left.
    total_quantity: f64,
    commission: f64,
    timestamp: NaiveDateTime,
}

/// Per-symbol FIFO queues of open lots, one pair of queues per matching run.
/// Owned by the call: two journals built in parallel share nothing.
#[derive(Debug, Default)]
pub struct OpenLotBook {
    longs: HashMap<String, VecDeque<OpenLot>>,
    shorts: HashMap<String, VecDeque<OpenLot>>,
}

impl OpenLotBook {
    pub fn long_quantity(&self, symbol: &str) -> f64 {
        Self::quantity(&self.longs, symbol)
    }

    pub fn short_quantity(&self, symbol: &str) -> f64 {
        Self::quantity(&self.shorts, symbol)
    }

    pub fn open_quantity(&self, symbol: &str) -> f64 {
        self.long_quantity(symbol) + self.short_quantity(symbol)
    }

    pub fn is_flat(&self, symbol: &str) -> bool {
        self.open_quantity(symbol) < QTY_EPSILON
    }

    /// Symbols with any residual open quantity.
    pub fn open_symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self
            .longs
            .keys()
            .chain(self.shorts.keys())
            .map(|s| s.as_str())
            .filter(|s| !self.is_flat(s))
            .collect();
        symbols.sort_unstable();
        symbols.dedup();
        symbols
    }

    fn quantity(queues: &HashMap<String, VecDeque<OpenLot>>, symbol: &str) -> f64 {
        queues
            .get(symbol)
            .map(|q| q.iter().map(|l| l.remaining).sum())
            .unwrap_or(0.0)
    }
}

/// The matcher's output: day-grouped trades plus whatever inventory is still
/// open after the last execution.
#[derive(Debug)]
pub struct TradeJournal {
    pub days: BTreeMap<String, DayEntry>,
    pub open_lots: OpenLotBook,
}

/// Matches an execution stream into round-trip trades grouped by closing
/// date, First-In-First-Out per symbol.
///
/// Executions are stably sorted by timestamp (input order breaks ties) and
/// scanned once. A buy consumes the short queue before opening long
/// inventory; a sell consumes the long queue before opening short inventory.
/// An unmatched remainder flips to the opposite queue, so a closing
/// execution larger than the available lots reverses net exposure intraday.
///
/// Day totals accumulate gross PnL during the scan; each day's commission
/// total is subtracted exactly once at the end, never per match. That single
/// subtraction is applied regardless of whether a trade's PnL came from the
/// broker-reported figure or the manual price difference, even though some
/// export variants may already report net-of-fee PnL -- the statement format
/// does not say, and subtracting once is the conservative reading.
pub fn build_journal(mut executions: Vec<Execution>) -> TradeJournal {
    executions.sort_by_key(|e| e.timestamp);

    let mut days: BTreeMap<String, DayEntry> = BTreeMap::new();
    let mut book = OpenLotBook::default();

    for execution in executions {
        process_execution(&mut book, &mut days, &execution);
    }

    for day in days.values_mut() {
        day.total -= day.fees;
    }

    TradeJournal { days, open_lots: book }
}

fn process_execution(
    book: &mut OpenLotBook,
    days: &mut BTreeMap<String, DayEntry>,
    execution: &Execution,
) {
    let (closing, opening, strategy) = match execution.side {
        Side::Buy => (&mut book.shorts, &mut book.longs, "Short-Cont."),
        Side::Sell => (&mut book.longs, &mut book.shorts, "Long-Cont."),
    };

    let date = execution.timestamp.date().format("%Y-%m-%d").to_string();
    let mut remaining = execution.quantity;

    if let Some(queue) = closing.get_mut(&execution.symbol) {
        while remaining > QTY_EPSILON {
            let Some(lot) = queue.front_mut() else { break };
            let matched = remaining.min(lot.remaining);

            // Broker-reported realized PnL wins when the export supplied it,
            // prorated across partial matches by quantity; otherwise the
            // price difference times the contract multiplier.
            let pnl = if execution.broker_reported_pnl != 0.0 {
                execution.broker_reported_pnl * matched / execution.quantity
            } else {
                let per_point = match execution.side {
                    Side::Buy => lot.price - execution.price,
                    Side::Sell => execution.price - lot.price,
                };
                per_point * matched * execution.multiplier
            };

            let fee = lot.commission * matched / lot.total_quantity
                + execution.commission * matched / execution.quantity;

            let day = days.entry(date.clone()).or_insert_with(|| DayEntry {
                date: date.clone(),
                ..Default::default()
            });
            day.trades.push(Trade {
                instrument: execution.symbol.clone(),
                quantity: matched,
                pnl,
                fee,
                strategy: strategy.to_string(),
                start_time: lot.timestamp,
                end_time: execution.timestamp,
            });
            day.fees += fee;
            // Gross only; the day's fees come off once, at the end.
            day.total += pnl;

            lot.remaining -= matched;
            remaining -= matched;
            if lot.remaining < QTY_EPSILON {
                queue.pop_front();
            }
        }
    }

    if remaining > QTY_EPSILON {
        opening
            .entry(execution.symbol.clone())
            .or_default()
            .push_back(OpenLot {
                price: execution.price,
                remaining,
                total_quantity: execution.quantity,
                commission: execution.commission,
                timestamp: execution.timestamp,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn exec(side: Side, qty: f64, price: f64, ts: NaiveDateTime) -> Execution {
        exec_full("MES", side, qty, price, ts, 0.0, 0.0, 5.0)
    }

    fn exec_full(
        symbol: &str,
        side: Side,
        qty: f64,
        price: f64,
        ts: NaiveDateTime,
        commission: f64,
        broker_pnl: f64,
        multiplier: f64,
    ) -> Execution {
        Execution {
            symbol: symbol.to_string(),
            contract_description: symbol.to_string(),
            side,
            quantity: qty,
            price,
            timestamp: ts,
            commission,
            multiplier,
            broker_reported_pnl: broker_pnl,
        }
    }

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
    }

    #[test]
    fn simple_round_trip() {
        // Buy 2 @ 100, Sell 2 @ 110, multiplier 50, no broker PnL.
        let journal = build_journal(vec![
            exec_full("ES", Side::Buy, 2.0, 100.0, at(3, 9, 30), 0.0, 0.0, 50.0),
            exec_full("ES", Side::Sell, 2.0, 110.0, at(3, 10, 0), 0.0, 0.0, 50.0),
        ]);
        let day = &journal.days["2024-06-03"];
        assert_eq!(day.trades.len(), 1);
        approx(day.trades[0].pnl, 1000.0);
        assert_eq!(day.trades[0].strategy, "Long-Cont.");
        assert!(journal.open_lots.is_flat("ES"));
    }

    #[test]
    fn short_cover_in_two_parts() {
        // Sell 5 short, cover 3 then 2; two trades, short queue empty.
        let journal = build_journal(vec![
            exec(Side::Sell, 5.0, 110.0, at(3, 9, 30)),
            exec(Side::Buy, 3.0, 100.0, at(3, 10, 0)),
            exec(Side::Buy, 2.0, 105.0, at(3, 11, 0)),
        ]);
        let day = &journal.days["2024-06-03"];
        assert_eq!(day.trades.len(), 2);
        let covered: f64 = day.trades.iter().map(|t| t.quantity).sum();
        approx(covered, 5.0);
        approx(day.trades[0].pnl, (110.0 - 100.0) * 3.0 * 5.0);
        approx(day.trades[1].pnl, (110.0 - 105.0) * 2.0 * 5.0);
        assert_eq!(day.trades[0].strategy, "Short-Cont.");
        assert!(journal.open_lots.is_flat("MES"));
    }

    #[test]
    fn broker_pnl_is_prorated_across_lots() {
        // Closing 10 with reported PnL 100 against lots of 4 and 6.
        let journal = build_journal(vec![
            exec(Side::Buy, 4.0, 100.0, at(3, 9, 30)),
            exec(Side::Buy, 6.0, 101.0, at(3, 9, 45)),
            exec_full("MES", Side::Sell, 10.0, 103.0, at(3, 10, 0), 0.0, 100.0, 5.0),
        ]);
        let day = &journal.days["2024-06-03"];
        assert_eq!(day.trades.len(), 2);
        approx(day.trades[0].pnl, 40.0);
        approx(day.trades[1].pnl, 60.0);
        approx(day.trades.iter().map(|t| t.pnl).sum::<f64>(), 100.0);
    }

    #[test]
    fn fees_prorate_by_each_sides_total_quantity() {
        let journal = build_journal(vec![
            exec_full("MES", Side::Buy, 4.0, 100.0, at(3, 9, 30), 2.0, 0.0, 5.0),
            exec_full("MES", Side::Sell, 2.0, 101.0, at(3, 10, 0), 1.0, 0.0, 5.0),
        ]);
        let day = &journal.days["2024-06-03"];
        assert_eq!(day.trades.len(), 1);
        // Half the opening fee (2 of 4 consumed) plus the full closing fee.
        approx(day.trades[0].fee, 2.0 * 2.0 / 4.0 + 1.0);
    }

    #[test]
    fn day_total_is_gross_minus_fees_once() {
        let journal = build_journal(vec![
            exec_full("MES", Side::Buy, 1.0, 100.0, at(3, 9, 0), 0.6, 0.0, 5.0),
            exec_full("MES", Side::Sell, 1.0, 102.0, at(3, 9, 30), 0.6, 0.0, 5.0),
            exec_full("MES", Side::Buy, 1.0, 101.0, at(3, 10, 0), 0.6, 0.0, 5.0),
            exec_full("MES", Side::Sell, 1.0, 104.0, at(3, 10, 30), 0.6, 0.0, 5.0),
            exec_full("MES", Side::Buy, 1.0, 103.0, at(3, 11, 0), 0.6, 0.0, 5.0),
            exec_full("MES", Side::Sell, 1.0, 103.5, at(3, 11, 30), 0.6, 0.0, 5.0),
        ]);
        let day = &journal.days["2024-06-03"];
        assert_eq!(day.trades.len(), 3);
        let gross: f64 = day.trades.iter().map(|t| t.pnl).sum();
        approx(day.total, gross - day.fees);
        assert!(day.fees > 0.0);
    }

    #[test]
    fn input_order_does_not_matter() {
        let fills = vec![
            exec(Side::Buy, 2.0, 100.0, at(3, 9, 30)),
            exec(Side::Sell, 1.0, 104.0, at(3, 10, 0)),
            exec(Side::Sell, 1.0, 108.0, at(3, 11, 0)),
            exec(Side::Buy, 3.0, 106.0, at(4, 9, 30)),
            exec(Side::Sell, 3.0, 107.0, at(4, 10, 0)),
        ];
        let mut shuffled = fills.clone();
        shuffled.reverse();
        shuffled.swap(0, 2);

        let a = build_journal(fills);
        let b = build_journal(shuffled);

        assert_eq!(a.days.len(), b.days.len());
        for (date, day) in &a.days {
            let other = &b.days[date];
            assert_eq!(day.trades.len(), other.trades.len());
            approx(day.total, other.total);
            for (t, o) in day.trades.iter().zip(&other.trades) {
                approx(t.pnl, o.pnl);
                approx(t.quantity, o.quantity);
            }
        }
    }

    #[test]
    fn quantity_is_conserved() {
        let fills = vec![
            exec(Side::Buy, 4.0, 100.0, at(3, 9, 30)),
            exec(Side::Sell, 6.0, 102.0, at(3, 10, 0)),
            exec(Side::Buy, 1.0, 101.0, at(3, 11, 0)),
            exec(Side::Sell, 2.0, 103.0, at(4, 9, 30)),
        ];
        let total_input: f64 = fills.iter().map(|e| e.quantity).sum();
        let journal = build_journal(fills);

        let matched: f64 = journal
            .days
            .values()
            .flat_map(|d| d.trades.iter())
            .map(|t| t.quantity)
            .sum();
        let open = journal.open_lots.open_quantity("MES");
        // Every matched unit consumes one unit from each side.
        approx(matched * 2.0 + open, total_input);
    }

    #[test]
    fn oversized_close_flips_exposure() {
        // Long 2, sell 5: 2 matched, short 3 remains open.
        let journal = build_journal(vec![
            exec(Side::Buy, 2.0, 100.0, at(3, 9, 30)),
            exec(Side::Sell, 5.0, 102.0, at(3, 10, 0)),
        ]);
        let day = &journal.days["2024-06-03"];
        assert_eq!(day.trades.len(), 1);
        approx(day.trades[0].quantity, 2.0);
        approx(journal.open_lots.short_quantity("MES"), 3.0);
        approx(journal.open_lots.long_quantity("MES"), 0.0);
        assert_eq!(journal.open_lots.open_symbols(), vec!["MES"]);
    }

    #[test]
    fn first_execution_opens_without_a_trade() {
        let journal = build_journal(vec![exec(Side::Sell, 5.0, 110.0, at(3, 9, 30))]);
        assert!(journal.days.is_empty());
        approx(journal.open_lots.short_quantity("MES"), 5.0);
    }

    #[test]
    fn one_lot_absorbs_multiple_partial_closes() {
        let journal = build_journal(vec![
            exec(Side::Buy, 10.0, 100.0, at(3, 9, 0)),
            exec(Side::Sell, 3.0, 101.0, at(3, 9, 30)),
            exec(Side::Sell, 3.0, 102.0, at(3, 10, 0)),
            exec(Side::Sell, 4.0, 103.0, at(3, 10, 30)),
        ]);
        let day = &journal.days["2024-06-03"];
        assert_eq!(day.trades.len(), 3);
        assert!(journal.open_lots.is_flat("MES"));
        // All three trades closed against the same opening lot.
        for trade in &day.trades {
            assert_eq!(trade.start_time, at(3, 9, 0));
        }
    }

    #[test]
    fn symbols_do_not_cross_match() {
        let journal = build_journal(vec![
            exec_full("MES", Side::Buy, 1.0, 100.0, at(3, 9, 0), 0.0, 0.0, 5.0),
            exec_full("MNQ", Side::Sell, 1.0, 200.0, at(3, 9, 30), 0.0, 0.0, 2.0),
        ]);
        assert!(journal.days.is_empty());
        approx(journal.open_lots.long_quantity("MES"), 1.0);
        approx(journal.open_lots.short_quantity("MNQ"), 1.0);
    }

    #[test]
    fn trades_land_on_the_closing_date() {
        let journal = build_journal(vec![
            exec(Side::Buy, 1.0, 100.0, at(3, 15, 0)),
            exec(Side::Sell, 1.0, 103.0, at(4, 9, 30)),
        ]);
        assert_eq!(journal.days.len(), 1);
        assert!(journal.days.contains_key("2024-06-04"));
    }
}

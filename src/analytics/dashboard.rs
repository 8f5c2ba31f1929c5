use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::models::{ParseEnumError, Trade};

/// Reported as the profit factor when there are wins but no losses.
pub const PROFIT_FACTOR_CAP: f64 = 99.9;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_trades: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub win_rate: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// None when there is no average loss to divide by
    pub win_loss_ratio: Option<f64>,
    pub expectancy: f64,
    pub total_pnl: f64,
    pub total_fees: f64,
    pub starting_balance: f64,
    pub current_balance: f64,
    pub return_percent: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityCurvePoint {
    pub date: NaiveDate,
    pub daily_pnl: f64,
    pub cumulative_pnl: f64,
    pub trade_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateRange {
    Today,
    Week,
    Month,
    ThreeMonths,
    SixMonths,
    Year,
    #[default]
    All,
}

impl DateRange {
    /// Earliest trade time included, in Unix milliseconds. `None` means no bound.
    pub fn threshold(&self, now: DateTime<Utc>) -> Option<i64> {
        let days = match self {
            DateRange::Today => {
                let midnight = now.date_naive().and_hms_opt(0, 0, 0)?.and_utc();
                return Some(midnight.timestamp_millis());
            }
            DateRange::Week => 7,
            DateRange::Month => 30,
            DateRange::ThreeMonths => 90,
            DateRange::SixMonths => 180,
            DateRange::Year => 365,
            DateRange::All => return None,
        };
        Some((now - Duration::days(days)).timestamp_millis())
    }
}

impl FromStr for DateRange {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "today" => Ok(DateRange::Today),
            "week" => Ok(DateRange::Week),
            "month" => Ok(DateRange::Month),
            "3months" => Ok(DateRange::ThreeMonths),
            "6months" => Ok(DateRange::SixMonths),
            "year" => Ok(DateRange::Year),
            "all" | "" => Ok(DateRange::All),
            _ => Err(ParseEnumError {
                kind: "date range",
                value: s.to_string(),
            }),
        }
    }
}

pub fn compute_dashboard(trades: &[Trade], starting_balance: f64) -> DashboardStats {
    let mut stats = DashboardStats {
        starting_balance,
        current_balance: starting_balance,
        ..Default::default()
    };
    if trades.is_empty() {
        return stats;
    }

    let mut best = f64::MIN;
    let mut worst = f64::MAX;
    for trade in trades {
        stats.total_trades += 1;
        stats.total_pnl += trade.pnl;
        stats.total_fees += trade.fees;
        if trade.is_win() {
            stats.winning_trades += 1;
            stats.gross_profit += trade.pnl;
        } else {
            stats.losing_trades += 1;
            stats.gross_loss += trade.pnl;
        }
        best = best.max(trade.pnl);
        worst = worst.min(trade.pnl);
    }
    stats.gross_loss = stats.gross_loss.abs();
    stats.best_trade = best;
    stats.worst_trade = worst;

    stats.win_rate = stats.winning_trades as f64 / stats.total_trades as f64 * 100.0;
    stats.profit_factor = if stats.gross_loss > 0.0 {
        stats.gross_profit / stats.gross_loss
    } else if stats.gross_profit > 0.0 {
        PROFIT_FACTOR_CAP
    } else {
        0.0
    };

    if stats.winning_trades > 0 {
        stats.avg_win = stats.gross_profit / stats.winning_trades as f64;
    }
    if stats.losing_trades > 0 {
        stats.avg_loss = stats.gross_loss / stats.losing_trades as f64;
    }
    stats.win_loss_ratio = (stats.avg_loss > 0.0).then(|| stats.avg_win / stats.avg_loss);

    let wr = stats.win_rate / 100.0;
    stats.expectancy = wr * stats.avg_win - (1.0 - wr) * stats.avg_loss;

    stats.current_balance = starting_balance + stats.total_pnl;
    if starting_balance > 0.0 {
        stats.return_percent = stats.total_pnl / starting_balance * 100.0;
    }

    let (max_drawdown, max_drawdown_percent) = max_drawdown(trades, starting_balance);
    stats.max_drawdown = max_drawdown;
    stats.max_drawdown_percent = max_drawdown_percent;

    stats
}

/// Largest peak-to-trough drop of the balance curve, walking trades oldest first.
/// Largest peak-to-trough fall in time order. The percentage is taken
/// against the highest balance of the whole period.
fn max_drawdown(trades: &[Trade], starting_balance: f64) -> (f64, f64) {
    let mut ordered: Vec<&Trade> = trades.iter().collect();
    ordered.sort_by_key(|t| t.traded_at);

    let mut balance = starting_balance;
    let mut peak = starting_balance;
    let mut max_dd: f64 = 0.0;

    for trade in ordered {
        balance += trade.pnl;
        peak = peak.max(balance);
        max_dd = max_dd.max(peak - balance);
    }

    let max_dd_percent = if peak > 0.0 { max_dd / peak * 100.0 } else { 0.0 };
    (max_dd, max_dd_percent)
}

/// Daily PnL buckets (UTC), oldest first.
pub fn equity_curve(trades: &[Trade]) -> Vec<EquityCurvePoint> {
    let mut days: BTreeMap<NaiveDate, (f64, i64)> = BTreeMap::new();
    for trade in trades {
        let entry = days.entry(trade.traded_at_utc().date_naive()).or_default();
        entry.0 += trade.pnl;
        entry.1 += 1;
    }

    let mut cumulative = 0.0;
    days.into_iter()
        .map(|(date, (daily_pnl, trade_count))| {
            cumulative += daily_pnl;
            EquityCurvePoint {
                date,
                daily_pnl,
                cumulative_pnl: cumulative,
                trade_count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateTradeInput, Direction, MarketType};
    use chrono::TimeZone;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn trade(pnl: f64, traded_at: i64) -> Trade {
        let mut t = CreateTradeInput {
            user_id: 1,
            symbol: "BTCUSDT".to_string(),
            direction: Direction::Long,
            entry_price: 1.0,
            exit_price: 1.0,
            size: 1.0,
            pnl: Some(pnl),
            fees: Some(0.5),
            market_type: MarketType::Futures,
            order_type: None,
            date: None,
            notes: String::new(),
        }
        .into_trade();
        t.traded_at = traded_at;
        t
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_empty_list() {
        let stats = compute_dashboard(&[], 1000.0);
        assert_eq!(stats.total_trades, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.profit_factor, 0.0);
        assert_eq!(stats.current_balance, 1000.0);
        assert_eq!(stats.win_loss_ratio, None);
    }

    #[test]
    fn test_core_ratios() {
        // wins: 100, 50 ; losses: -30, 0, -20
        let trades = vec![
            trade(100.0, 1),
            trade(-30.0, 2),
            trade(50.0, 3),
            trade(0.0, 4),
            trade(-20.0, 5),
        ];
        let stats = compute_dashboard(&trades, 1000.0);

        assert_eq!(stats.total_trades, 5);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 3);
        assert!(approx(stats.win_rate, 40.0));
        assert!(approx(stats.gross_profit, 150.0));
        assert!(approx(stats.gross_loss, 50.0));
        assert!(approx(stats.profit_factor, 3.0));
        assert!(approx(stats.avg_win, 75.0));
        assert!(approx(stats.avg_loss, 50.0 / 3.0));
        assert!(approx(stats.expectancy, 0.4 * 75.0 - 0.6 * (50.0 / 3.0)));
        assert!(approx(stats.win_loss_ratio.unwrap(), 4.5));
        assert!(approx(stats.total_pnl, 100.0));
        assert!(approx(stats.total_fees, 2.5));
        assert!(approx(stats.current_balance, 1100.0));
        assert!(approx(stats.return_percent, 10.0));
        assert_eq!(stats.best_trade, 100.0);
        assert_eq!(stats.worst_trade, -30.0);
    }

    #[test]
    fn test_profit_factor_cap_without_losses() {
        let stats = compute_dashboard(&[trade(10.0, 1), trade(5.0, 2)], 0.0);
        assert_eq!(stats.profit_factor, PROFIT_FACTOR_CAP);
        assert_eq!(stats.return_percent, 0.0);
        assert_eq!(stats.win_loss_ratio, None);
    }

    #[test]
    fn test_drawdown_follows_time_order() {
        // Sorted by time: +200 (peak 1200), -300 (900), +50 (950), -150 (800)
        let trades = vec![
            trade(-150.0, 4),
            trade(200.0, 1),
            trade(50.0, 3),
            trade(-300.0, 2),
        ];
        let stats = compute_dashboard(&trades, 1000.0);
        assert!(approx(stats.max_drawdown, 400.0));
        assert!(approx(stats.max_drawdown_percent, 400.0 / 1200.0 * 100.0));
    }

    #[test]
    fn test_drawdown_percent_uses_final_peak() {
        // 1000 -> 500 (drawdown 500 from 1000), then 2500 becomes the peak
        let trades = vec![trade(-500.0, 1), trade(2000.0, 2)];
        let stats = compute_dashboard(&trades, 1000.0);
        assert!(approx(stats.max_drawdown, 500.0));
        assert!(approx(stats.max_drawdown_percent, 20.0));
    }

    #[test]
    fn test_equity_curve_groups_by_day() {
        let trades = vec![
            trade(10.0, 2 * DAY_MS + 5),
            trade(-4.0, 5),
            trade(6.0, 10),
        ];
        let curve = equity_curve(&trades);
        assert_eq!(curve.len(), 2);
        assert_eq!(curve[0].date, NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        assert_eq!(curve[0].trade_count, 2);
        assert!(approx(curve[0].daily_pnl, 2.0));
        assert!(approx(curve[1].cumulative_pnl, 12.0));
    }

    #[test]
    fn test_date_range_thresholds() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap();
        let midnight = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(DateRange::Today.threshold(now), Some(midnight.timestamp_millis()));
        assert_eq!(
            DateRange::Week.threshold(now),
            Some(now.timestamp_millis() - 7 * DAY_MS)
        );
        assert_eq!(DateRange::All.threshold(now), None);
        assert_eq!("3months".parse::<DateRange>().unwrap(), DateRange::ThreeMonths);
        assert!("decade".parse::<DateRange>().is_err());
    }
}

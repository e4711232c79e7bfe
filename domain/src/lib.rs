use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const BASE_CURRENCY: &str = "EUR";

/// One open holding on a snapshot date, shaped like a `positions_daily` row.
///
/// Optional fields serialize as `null` instead of being skipped: bulk upserts need every row to
/// carry the same set of keys.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PositionRecord {
    pub snapshot_date: NaiveDate,
    pub symbol: Option<String>,
    pub isin: Option<String>,
    pub name: Option<String>,
    pub currency: Option<String>,
    pub quantity: Option<f64>,
    pub avg_price: Option<f64>,
    pub last_price: Option<f64>,
    pub market_value_eur: f64,
    pub unrealized_pnl_eur: Option<f64>,
    pub realized_pnl_eur: Option<f64>,
    pub weight: Option<f64>,
}

impl PositionRecord {
    /// Label used in logs and previews: symbol, then ISIN, then a placeholder.
    pub fn label(&self) -> &str {
        self.symbol
            .as_deref()
            .or(self.isin.as_deref())
            .unwrap_or("<unknown>")
    }
}

/// Aggregate row written once per run to `portfolio_snapshots`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PortfolioSnapshot {
    pub snapshot_date: NaiveDate,
    pub base_currency: String,
    pub nav_eur: f64,
}

impl PortfolioSnapshot {
    pub fn new(snapshot_date: NaiveDate, nav_eur: f64) -> Self {
        Self {
            snapshot_date,
            base_currency: BASE_CURRENCY.to_string(),
            nav_eur,
        }
    }
}

/// Outcome of one run, printed as the final summary line.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSummary {
    pub snapshot_date: NaiveDate,
    pub nav_eur: f64,
    pub positions: usize,
    pub skipped: usize,
}

impl std::fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "OK | date={} nav_eur={:.2} positions={}",
            self.snapshot_date, self.nav_eur, self.positions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn position_row_keeps_null_fields() {
        let record = PositionRecord {
            snapshot_date: date(),
            symbol: Some("AAPL".to_string()),
            isin: None,
            name: None,
            currency: Some("USD".to_string()),
            quantity: Some(10.0),
            avg_price: None,
            last_price: None,
            market_value_eur: 1500.0,
            unrealized_pnl_eur: None,
            realized_pnl_eur: None,
            weight: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["snapshot_date"], "2024-03-15");
        assert!(value["isin"].is_null());
        assert!(value["weight"].is_null());
        assert_eq!(value.as_object().unwrap().len(), 12);
    }

    #[test]
    fn snapshot_uses_base_currency() {
        let snapshot = PortfolioSnapshot::new(date(), 1000.0);
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["base_currency"], "EUR");
        assert_eq!(value["nav_eur"], 1000.0);
    }

    #[test]
    fn summary_line_format() {
        let summary = SyncSummary {
            snapshot_date: date(),
            nav_eur: 1000.0,
            positions: 2,
            skipped: 0,
        };
        assert_eq!(
            summary.to_string(),
            "OK | date=2024-03-15 nav_eur=1000.00 positions=2"
        );
    }
}

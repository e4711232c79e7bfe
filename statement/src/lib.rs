use chrono::NaiveDate;
use domain::PositionRecord;
use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};
use thiserror::Error;
use tracing::{debug, warn};

const OPEN_POSITION: &[u8] = b"OpenPosition";

#[derive(Debug, Error)]
pub enum StatementError {
    #[error("malformed flex statement: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed flex statement: document ends with {open} unclosed element(s)")]
    Truncated { open: usize },
    #[error("malformed flex statement: no root element")]
    NoRoot,
}

/// Positions pulled out of one statement, with the NAV accumulated while building them.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedStatement {
    pub positions: Vec<PositionRecord>,
    pub nav_eur: f64,
    /// Open positions dropped because their market value was missing or unparsable.
    pub skipped: usize,
}

/// Parses a number the way the statement formats them: thousands separators are stripped and
/// anything that still fails to parse (or is not finite) becomes `None`.
pub fn parse_number(raw: Option<&str>) -> Option<f64> {
    let cleaned: String = raw?.chars().filter(|c| *c != ',').collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Walks every `OpenPosition` element of the statement.
pub fn extract_positions(
    xml: &str,
    snapshot_date: NaiveDate,
) -> Result<ExtractedStatement, StatementError> {
    let mut reader = Reader::from_str(xml);
    let mut positions = Vec::new();
    let mut nav_eur = 0.0;
    let mut skipped = 0usize;
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        let element = match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                saw_root = true;
                e
            }
            Event::Empty(e) => {
                saw_root = true;
                e
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };
        if element.local_name().as_ref() != OPEN_POSITION {
            continue;
        }

        let raw = RawPosition::from_element(&element)?;
        match raw.into_record(snapshot_date) {
            Some(record) => {
                nav_eur += record.market_value_eur;
                positions.push(record);
            }
            None => skipped += 1,
        }
    }

    // The reader does not check for unclosed elements at end of input.
    if depth != 0 {
        return Err(StatementError::Truncated { open: depth });
    }
    if !saw_root {
        return Err(StatementError::NoRoot);
    }

    debug!(positions = positions.len(), skipped, nav_eur, "statement extracted");
    Ok(ExtractedStatement {
        positions,
        nav_eur,
        skipped,
    })
}

/// Back-fills each position's share of NAV. A zero NAV leaves every weight empty.
pub fn apply_weights(positions: &mut [PositionRecord], nav_eur: f64) {
    for position in positions.iter_mut() {
        position.weight = if nav_eur != 0.0 {
            Some(position.market_value_eur / nav_eur)
        } else {
            None
        };
    }
}

#[derive(Default)]
struct RawPosition {
    symbol: Option<String>,
    isin: Option<String>,
    description: Option<String>,
    currency: Option<String>,
    position: Option<String>,
    average_price: Option<String>,
    mark_price: Option<String>,
    market_value_in_base: Option<String>,
    unrealized_pnl_in_base: Option<String>,
    realized_pnl_in_base: Option<String>,
}

impl RawPosition {
    fn from_element(element: &BytesStart<'_>) -> Result<Self, StatementError> {
        let mut raw = RawPosition::default();
        for attr in element.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let slot = match attr.key.local_name().as_ref() {
                b"symbol" => &mut raw.symbol,
                b"isin" => &mut raw.isin,
                b"description" => &mut raw.description,
                b"currency" => &mut raw.currency,
                b"position" => &mut raw.position,
                b"averagePrice" => &mut raw.average_price,
                b"markPrice" => &mut raw.mark_price,
                b"marketValueInBase" => &mut raw.market_value_in_base,
                b"unrealizedPnLInBase" => &mut raw.unrealized_pnl_in_base,
                b"realizedPnLInBase" => &mut raw.realized_pnl_in_base,
                _ => continue,
            };
            *slot = Some(attr.unescape_value()?.into_owned());
        }
        Ok(raw)
    }

    fn into_record(self, snapshot_date: NaiveDate) -> Option<PositionRecord> {
        let Some(market_value_eur) = parse_number(self.market_value_in_base.as_deref()) else {
            // Excluded from both the output and the NAV.
            warn!(
                symbol = self.symbol.as_deref().unwrap_or(""),
                isin = self.isin.as_deref().unwrap_or(""),
                market_value = self.market_value_in_base.as_deref().unwrap_or(""),
                "open position skipped: marketValueInBase missing or not numeric"
            );
            return None;
        };

        Some(PositionRecord {
            snapshot_date,
            symbol: non_empty(self.symbol),
            isin: non_empty(self.isin),
            name: non_empty(self.description),
            currency: non_empty(self.currency),
            quantity: parse_number(self.position.as_deref()),
            avg_price: parse_number(self.average_price.as_deref()),
            last_price: parse_number(self.mark_price.as_deref()),
            market_value_eur,
            unrealized_pnl_eur: parse_number(self.unrealized_pnl_in_base.as_deref()),
            realized_pnl_eur: parse_number(self.realized_pnl_in_base.as_deref()),
            weight: None,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn statement(positions: &str) -> String {
        format!(
            r#"<FlexQueryResponse queryName="daily" type="AF">
<FlexStatements count="1">
<FlexStatement accountId="U1234567" fromDate="20240315" toDate="20240315">
<OpenPositions>
{positions}
</OpenPositions>
</FlexStatement>
</FlexStatements>
</FlexQueryResponse>"#
        )
    }

    #[test]
    fn parse_number_strips_thousands_separators() {
        assert_eq!(parse_number(Some("1,234.56")), Some(1234.56));
        assert_eq!(parse_number(Some(" -2,000 ")), Some(-2000.0));
        assert_eq!(parse_number(Some("12")), Some(12.0));
    }

    #[test]
    fn parse_number_returns_none_instead_of_failing() {
        assert_eq!(parse_number(None), None);
        assert_eq!(parse_number(Some("")), None);
        assert_eq!(parse_number(Some("   ")), None);
        assert_eq!(parse_number(Some("n/a")), None);
        assert_eq!(parse_number(Some("--")), None);
        assert_eq!(parse_number(Some("nan")), None);
        assert_eq!(parse_number(Some("inf")), None);
    }

    #[test]
    fn extracts_fields_and_accumulates_nav() {
        let xml = statement(
            r#"<OpenPosition symbol="AAPL" isin="US0378331005" description="APPLE INC" currency="USD" position="10" averagePrice="150.5" markPrice="170.25" marketValueInBase="1,560.30" unrealizedPnLInBase="180.1" realizedPnLInBase="0"/>
<OpenPosition symbol="IWDA" isin="IE00B4L5Y983" description="ISHARES CORE MSCI WORLD" currency="EUR" position="20" averagePrice="80" markPrice="90" marketValueInBase="1800" unrealizedPnLInBase="200" realizedPnLInBase=""/>"#,
        );
        let extracted = extract_positions(&xml, date()).unwrap();

        assert_eq!(extracted.positions.len(), 2);
        assert_eq!(extracted.skipped, 0);
        assert!((extracted.nav_eur - 3360.30).abs() < 1e-9);

        let apple = &extracted.positions[0];
        assert_eq!(apple.snapshot_date, date());
        assert_eq!(apple.symbol.as_deref(), Some("AAPL"));
        assert_eq!(apple.isin.as_deref(), Some("US0378331005"));
        assert_eq!(apple.name.as_deref(), Some("APPLE INC"));
        assert_eq!(apple.currency.as_deref(), Some("USD"));
        assert_eq!(apple.quantity, Some(10.0));
        assert_eq!(apple.avg_price, Some(150.5));
        assert_eq!(apple.last_price, Some(170.25));
        assert_eq!(apple.market_value_eur, 1560.30);
        assert_eq!(apple.unrealized_pnl_eur, Some(180.1));
        assert_eq!(apple.realized_pnl_eur, Some(0.0));
        assert_eq!(apple.weight, None);

        assert_eq!(extracted.positions[1].realized_pnl_eur, None);
    }

    #[test]
    fn nav_equals_sum_of_market_values() {
        let xml = statement(
            r#"<OpenPosition symbol="A" marketValueInBase="100.25"/>
<OpenPosition symbol="B" marketValueInBase="-40"/>
<OpenPosition symbol="C" marketValueInBase="2,000"/>"#,
        );
        let extracted = extract_positions(&xml, date()).unwrap();
        let sum: f64 = extracted.positions.iter().map(|p| p.market_value_eur).sum();
        assert_eq!(extracted.nav_eur, sum);
        assert_eq!(extracted.nav_eur, 2060.25);
    }

    #[test]
    fn positions_without_market_value_are_skipped() {
        let xml = statement(
            r#"<OpenPosition symbol="KEEP" marketValueInBase="500"/>
<OpenPosition symbol="MISSING"/>
<OpenPosition symbol="TEXT" marketValueInBase="n/a"/>
<OpenPosition symbol="EMPTY" marketValueInBase=""/>"#,
        );
        let extracted = extract_positions(&xml, date()).unwrap();
        assert_eq!(extracted.positions.len(), 1);
        assert_eq!(extracted.positions[0].symbol.as_deref(), Some("KEEP"));
        assert_eq!(extracted.nav_eur, 500.0);
        assert_eq!(extracted.skipped, 3);
    }

    #[test]
    fn empty_text_attributes_become_none_and_entities_are_unescaped() {
        let xml = statement(
            r#"<OpenPosition symbol="" isin="" description="PROCTER &amp; GAMBLE" currency="" marketValueInBase="10"></OpenPosition>"#,
        );
        let extracted = extract_positions(&xml, date()).unwrap();
        let position = &extracted.positions[0];
        assert_eq!(position.symbol, None);
        assert_eq!(position.isin, None);
        assert_eq!(position.currency, None);
        assert_eq!(position.name.as_deref(), Some("PROCTER & GAMBLE"));
    }

    #[test]
    fn statement_without_positions_has_zero_nav() {
        let extracted = extract_positions(&statement(""), date()).unwrap();
        assert!(extracted.positions.is_empty());
        assert_eq!(extracted.nav_eur, 0.0);
    }

    #[test]
    fn malformed_statement_is_an_error() {
        assert!(extract_positions("<A><B></A>", date()).is_err());
    }

    #[test]
    fn truncated_statement_is_rejected() {
        let xml = r#"<FlexQueryResponse><FlexStatements><FlexStatement><OpenPositions><OpenPosition symbol="A" marketValueInBase="600"/>"#;
        assert!(matches!(
            extract_positions(xml, date()),
            Err(StatementError::Truncated { open: 4 })
        ));
    }

    #[test]
    fn input_without_root_is_rejected() {
        assert!(matches!(
            extract_positions("", date()),
            Err(StatementError::NoRoot)
        ));
        assert!(matches!(
            extract_positions("Statement generation in progress", date()),
            Err(StatementError::NoRoot)
        ));
    }

    #[test]
    fn self_closing_root_is_complete() {
        let extracted = extract_positions("<FlexQueryResponse/>", date()).unwrap();
        assert!(extracted.positions.is_empty());
    }

    #[test]
    fn weights_are_fractions_of_nav() {
        let xml = statement(
            r#"<OpenPosition symbol="A" marketValueInBase="600"/>
<OpenPosition symbol="B" marketValueInBase="400"/>"#,
        );
        let mut extracted = extract_positions(&xml, date()).unwrap();
        apply_weights(&mut extracted.positions, extracted.nav_eur);
        assert_eq!(extracted.positions[0].weight, Some(0.6));
        assert_eq!(extracted.positions[1].weight, Some(0.4));
    }

    #[test]
    fn zero_nav_leaves_weights_empty() {
        let xml = statement(
            r#"<OpenPosition symbol="LONG" marketValueInBase="250"/>
<OpenPosition symbol="SHORT" marketValueInBase="-250"/>"#,
        );
        let mut extracted = extract_positions(&xml, date()).unwrap();
        assert_eq!(extracted.nav_eur, 0.0);
        apply_weights(&mut extracted.positions, extracted.nav_eur);
        assert!(extracted.positions.iter().all(|p| p.weight.is_none()));
    }
}

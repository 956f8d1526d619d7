//! Writing the store to the sheet.

use crate::model::{Range, Record, SHEET_COLUMNS};
use serde::Serialize;
use serde_json::Value;

/// What a push did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PushOutcome {
    /// The store was empty, so the sheet was left alone.
    NothingToPush,
    /// `rows` rows were written to `range`.
    Pushed {
        rows: usize,
        range: String,
        response: Value,
    },
}

/// Formats records as sheet rows in `SHEET_COLUMNS` order.
pub fn sheet_rows(records: &[Record]) -> Vec<Vec<Value>> {
    records.iter().map(|r| r.to_new().to_sheet_row()).collect()
}

/// The range of exactly `rows` x `SHEET_COLUMNS` cells whose top-left corner is `anchor`.
pub fn target_range(anchor: &Range, rows: usize) -> Range {
    Range::sized(
        anchor.sheet.as_deref(),
        anchor.start,
        rows,
        SHEET_COLUMNS.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Amount;
    use chrono::{NaiveDate, Utc};
    use serde_json::json;

    #[test]
    fn test_target_range() {
        let anchor: Range = "A2".parse().unwrap();
        assert_eq!(target_range(&anchor, 1).to_string(), "A2:E2");
        assert_eq!(target_range(&anchor, 500).to_string(), "A2:E501");

        let anchor: Range = "'Sales Log'!C5".parse().unwrap();
        assert_eq!(target_range(&anchor, 2).to_string(), "'Sales Log'!C5:G6");
    }

    #[test]
    fn test_sheet_rows() {
        let record = Record {
            id: 1,
            transaction_id: "T1".to_string(),
            amount: "9.99".parse::<Amount>().unwrap(),
            currency: "USD".to_string(),
            payment_method: "card".to_string(),
            purchase_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            recorded_at: Utc::now(),
        };
        assert_eq!(
            sheet_rows(&[record]),
            vec![vec![
                json!("T1"),
                json!(9.99),
                json!("USD"),
                json!("card"),
                json!("2024-01-05")
            ]]
        );
    }

    #[test]
    fn test_outcome_json() {
        let json = serde_json::to_value(PushOutcome::NothingToPush).unwrap();
        assert_eq!(json, json!({ "status": "nothing_to_push" }));
    }
}

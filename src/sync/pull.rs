//! Turning a block of sheet cells into records.

use crate::model::{cell_to_string, parse_date, Amount, NewRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// A bulk payload as sent by the sheet's script. `values[0]` is the header row. `values` is
/// required; an empty list clears the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetPayload {
    #[serde(default)]
    pub sheet_name: Option<String>,
    #[serde(default)]
    pub range: Option<String>,
    pub values: Vec<Vec<Value>>,
}

/// What a pull did to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PullOutcome {
    /// Rows written to the store.
    pub inserted: usize,
    /// Data rows that were dropped because they could not be parsed.
    pub skipped: usize,
    /// Rows that were in the store before the pull.
    pub removed: u64,
}

/// The longest text the store's `VARCHAR(255)` columns take.
const MAX_TEXT_CHARS: usize = 255;

/// Parses every row after the header. A row is dropped when its transaction id is missing, its
/// amount is not a number or does not fit the stored scale, or any text cell is too long for the
/// store, so one bad row cannot fail the whole replace. A purchase date that cannot be parsed
/// becomes `today`. Missing currency and payment method cells become empty strings.
pub fn parse_payload(values: &[Vec<Value>], today: NaiveDate) -> (Vec<NewRecord>, usize) {
    let mut records = Vec::new();
    let mut skipped = 0;
    for (ix, row) in values.iter().enumerate().skip(1) {
        match parse_row(row, today) {
            Some(record) => records.push(record),
            None => {
                debug!("Skipping row {}: {row:?}", ix + 1);
                skipped += 1;
            }
        }
    }
    (records, skipped)
}

fn parse_row(row: &[Value], today: NaiveDate) -> Option<NewRecord> {
    let cell = |ix: usize| row.get(ix).unwrap_or(&Value::Null);

    let transaction_id = cell_to_string(cell(0)).trim().to_string();
    if transaction_id.is_empty() {
        return None;
    }

    let amount = match Amount::from_cell(cell(1)) {
        Ok(amount) if amount.fits_stored_scale() => amount,
        Ok(amount) => {
            warn!("Dropping transaction '{transaction_id}': amount {amount} is out of range");
            return None;
        }
        Err(e) => {
            warn!("Dropping transaction '{transaction_id}': {e}");
            return None;
        }
    };

    let currency = cell_to_string(cell(2));
    let payment_method = cell_to_string(cell(3));
    if [&transaction_id, &currency, &payment_method]
        .iter()
        .any(|text| text.chars().count() > MAX_TEXT_CHARS)
    {
        warn!("Dropping a transaction with a cell over {MAX_TEXT_CHARS} characters");
        return None;
    }

    let purchase_date = match parse_date(cell(4)) {
        Ok(date) => date,
        Err(e) => {
            warn!("Transaction '{transaction_id}': {e}, using the current date");
            today
        }
    };

    Some(NewRecord {
        transaction_id,
        amount,
        currency,
        payment_method,
        purchase_date,
    })
}

/// Wraps string cells, as read from the sheet, in JSON values.
pub fn string_cells(rows: Vec<Vec<String>>) -> Vec<Vec<Value>> {
    rows.into_iter()
        .map(|row| row.into_iter().map(Value::String).collect())
        .collect()
}

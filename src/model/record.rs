use crate::model::Amount;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Debug, Display, Formatter};

/// The column order used when a record is written to the sheet. The sheet's header row is laid
/// out in this order, so it must not change.
pub const SHEET_COLUMNS: [&str; 5] = [
    "transaction_id",
    "amount",
    "currency",
    "payment_method",
    "purchase_date",
];

/// The format used for dates in JSON and in sheet cells.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A row of the `transactions` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Record {
    /// Assigned by the store, unique and immutable.
    pub id: i64,
    /// The natural key used by upserts.
    pub transaction_id: String,
    pub amount: Amount,
    pub currency: String,
    pub payment_method: String,
    pub purchase_date: NaiveDate,
    /// When the row was inserted.
    pub recorded_at: DateTime<Utc>,
}

impl Record {
    /// The insertable fields of this record.
    pub fn to_new(&self) -> NewRecord {
        NewRecord {
            transaction_id: self.transaction_id.clone(),
            amount: self.amount,
            currency: self.currency.clone(),
            payment_method: self.payment_method.clone(),
            purchase_date: self.purchase_date,
        }
    }
}

/// The fields of a `Record` that a caller supplies. `id` and `recorded_at` come from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NewRecord {
    pub transaction_id: String,
    pub amount: Amount,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub payment_method: String,
    pub purchase_date: NaiveDate,
}

impl NewRecord {
    /// Formats the record as a sheet row in `SHEET_COLUMNS` order. The amount is a number cell,
    /// everything else is text.
    pub fn to_sheet_row(&self) -> Vec<Value> {
        vec![
            Value::String(self.transaction_id.clone()),
            self.amount.to_cell(),
            Value::String(self.currency.clone()),
            Value::String(self.payment_method.clone()),
            Value::String(self.purchase_date.format(DATE_FORMAT).to_string()),
        ]
    }
}

/// An error that can occur when parsing a cell into a date.
pub struct DateError(String);

impl Debug for DateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for DateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unable to parse '{}' as a date", self.0)
    }
}

impl std::error::Error for DateError {}

/// Date layouts accepted from sheet cells, tried in order. The US layouts go before
/// `%Y/%m/%d`, and two-digit years before four, since `%Y` reads "2" or "24" as a year.
const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d", "%d %B %Y"];

/// Parses below this year are taken as a misread layout rather than a real date.
const MIN_YEAR: i32 = 1000;

/// Parses a sheet cell as a calendar date. Accepts ISO dates, RFC 3339 timestamps (the date in
/// UTC is taken) and the US-style layouts Sheets produces for formatted dates.
pub fn parse_date(cell: &Value) -> Result<NaiveDate, DateError> {
    let s = match cell {
        Value::String(s) => s.trim(),
        other => return Err(DateError(other.to_string())),
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc).date_naive());
    }
    DATE_LAYOUTS
        .iter()
        .filter_map(|layout| NaiveDate::parse_from_str(s, layout).ok())
        .find(|date| date.year() >= MIN_YEAR)
        .ok_or_else(|| DateError(s.to_string()))
}

/// Renders a JSON cell as the text a sheet would show for it.
pub fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_to_sheet_row_column_order() {
        let record = NewRecord {
            transaction_id: "T1".into(),
            amount: Amount::from_str("9.99").unwrap(),
            currency: "USD".into(),
            payment_method: "card".into(),
            purchase_date: date("2024-01-05"),
        };
        assert_eq!(
            record.to_sheet_row(),
            vec![json!("T1"), json!(9.99), json!("USD"), json!("card"), json!("2024-01-05")]
        );
    }

    #[test]
    fn test_parse_date_layouts() {
        let expected = date("2024-02-01");
        assert_eq!(parse_date(&json!("2024-02-01")).unwrap(), expected);
        assert_eq!(parse_date(&json!("2024/02/01")).unwrap(), expected);
        assert_eq!(parse_date(&json!("2/1/2024")).unwrap(), expected);
        assert_eq!(parse_date(&json!("2/1/24")).unwrap(), expected);
        assert_eq!(parse_date(&json!("1 February 2024")).unwrap(), expected);
        assert_eq!(
            parse_date(&json!("2024-02-01T23:30:00-05:00")).unwrap(),
            date("2024-02-02")
        );
    }

    #[test]
    fn test_parse_date_short_us_dates_are_not_read_as_year_first() {
        assert_eq!(parse_date(&json!("2/1/24")).unwrap(), date("2024-02-01"));
        assert_eq!(parse_date(&json!("12/31/99")).unwrap(), date("1999-12-31"));
        assert_eq!(parse_date(&json!("10/11/12")).unwrap(), date("2012-10-11"));
        // Only parses as the year 3, which is not a real purchase date
        assert!(parse_date(&json!("1/2/0003")).is_err());
        assert!(parse_date(&json!("0003-01-02")).is_err());
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date(&json!("not a date")).is_err());
        assert!(parse_date(&json!(null)).is_err());
        assert!(parse_date(&json!(45321)).is_err());
    }

    #[test]
    fn test_record_json_shape() {
        let record = Record {
            id: 7,
            transaction_id: "T1".into(),
            amount: Amount::from_str("9.99").unwrap(),
            currency: "USD".into(),
            payment_method: "card".into(),
            purchase_date: date("2024-01-05"),
            recorded_at: DateTime::parse_from_rfc3339("2024-01-05T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["purchase_date"], json!("2024-01-05"));
        assert_eq!(value["amount"], json!("9.99"));
        assert_eq!(value["id"], json!(7));
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&json!(null)), "");
        assert_eq!(cell_to_string(&json!("x")), "x");
        assert_eq!(cell_to_string(&json!(9.99)), "9.99");
        assert_eq!(cell_to_string(&json!(true)), "true");
    }
}

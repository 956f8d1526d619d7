//! Types that represent the core data model: `Record`, `Amount`, and A1 range references.
mod a1;
mod amount;
mod record;

pub use a1::{col_letters, Cell, Range};
pub use amount::{Amount, AmountError};
pub use record::{
    cell_to_string, parse_date, DateError, NewRecord, Record, DATE_FORMAT, SHEET_COLUMNS,
};

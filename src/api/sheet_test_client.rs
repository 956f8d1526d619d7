//! Implements the `Sheet` trait using in-memory data for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without using Google Sheets.

use crate::api::{Sheet, SheetSnapshot};
use crate::error::Res;
use crate::model::{cell_to_string, Cell, Range};
use anyhow::{bail, Context};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Cursor;
use tokio::sync::Mutex;

/// An implementation of the `Sheet` trait that does not use Google sheets. It holds a grid of
/// strings per sheet name, as a formatted read would return them, and a version counter that
/// moves on every write.
pub struct TestSheet {
    state: Mutex<TestSheetState>,
}

/// The full state of a `TestSheet`, exposed so tests can inspect and arrange it.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct TestSheetState {
    /// Sheet name -> rows. The first inserted sheet is the one unqualified ranges address.
    pub sheets: BTreeMap<String, Vec<Vec<String>>>,
    /// The sheet that unqualified ranges refer to.
    pub default_sheet: String,
    /// Bumped on every mutation; served as the version tag.
    pub version: u64,
    /// The next this-many calls fail with a simulated backend error.
    pub failures: usize,
}

impl TestSheet {
    /// Create a new `TestSheet` with a single empty sheet named `default_sheet`.
    pub fn new(default_sheet: &str) -> Self {
        let mut sheets = BTreeMap::new();
        sheets.insert(default_sheet.to_string(), Vec::new());
        Self {
            state: Mutex::new(TestSheetState {
                sheets,
                default_sheet: default_sheet.to_string(),
                version: 1,
                failures: 0,
            }),
        }
    }

    /// Create a `TestSheet` whose `default_sheet` holds the seed data from this module.
    pub fn seeded(default_sheet: &str) -> Res<Self> {
        let sheet = Self::new(default_sheet);
        let rows = load_csv(SEED_DATA)?;
        sheet
            .state
            .try_lock()
            .context("A freshly created TestSheet is already locked")?
            .sheets
            .insert(default_sheet.to_string(), rows);
        Ok(sheet)
    }

    /// Returns a copy of the current state.
    pub async fn get_state(&self) -> TestSheetState {
        self.state.lock().await.clone()
    }

    /// Replaces the rows of `sheet_name` and bumps the version.
    pub async fn set_rows(&self, sheet_name: &str, rows: Vec<Vec<String>>) {
        let mut state = self.state.lock().await;
        state.sheets.insert(sheet_name.to_string(), rows);
        state.version += 1;
    }

    /// Makes the next `n` calls fail.
    pub async fn fail_next(&self, n: usize) {
        self.state.lock().await.failures = n;
    }
}

impl TestSheetState {
    /// Consumes one pending simulated failure, if any.
    fn check_failure(&mut self) -> Res<()> {
        if self.failures > 0 {
            self.failures -= 1;
            bail!("Simulated backend failure (503 Service Unavailable)");
        }
        Ok(())
    }

    /// Parses `range` and resolves the sheet it addresses.
    fn resolve(&mut self, range: &str) -> Res<(&mut Vec<Vec<String>>, Range)> {
        let parsed: Range = range
            .parse()
            .with_context(|| format!("Unable to parse range: {range}"))?;
        let name = parsed
            .sheet
            .clone()
            .unwrap_or_else(|| self.default_sheet.clone());
        let grid = self
            .sheets
            .get_mut(&name)
            .with_context(|| format!("Unable to parse range: {range}"))?;
        Ok((grid, parsed))
    }
}

#[async_trait::async_trait]
impl Sheet for TestSheet {
    async fn read_range(&self, range: &str) -> Res<SheetSnapshot> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        let version_tag = state.version.to_string();
        let (grid, r) = state.resolve(range)?;

        let bottom = r.bottom().unwrap_or(usize::MAX);
        let mut values: Vec<Vec<String>> = grid
            .iter()
            .enumerate()
            .filter(|(ix, _)| *ix >= r.top() && *ix <= bottom)
            .map(|(_, row)| {
                let mut cells: Vec<String> = row
                    .iter()
                    .enumerate()
                    .filter(|(ix, _)| *ix >= r.left() && *ix <= r.right())
                    .map(|(_, v)| v.clone())
                    .collect();
                trim_trailing(&mut cells, |c| c.is_empty());
                cells
            })
            .collect();
        trim_trailing(&mut values, |row| row.is_empty());

        Ok(SheetSnapshot {
            values,
            version_tag,
        })
    }

    async fn version_tag(&self) -> Res<String> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        Ok(state.version.to_string())
    }

    async fn append_rows(&self, range: &str, rows: &[Vec<Value>]) -> Res<Value> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        let (grid, r) = state.resolve(range)?;

        let next_row = grid
            .iter()
            .rposition(|row| row.iter().any(|c| !c.is_empty()))
            .map(|ix| ix + 1)
            .unwrap_or(0)
            .max(r.top());
        write_cells(grid, next_row, r.left(), rows);
        let written = Range::sized(
            r.sheet.as_deref(),
            Cell::new(next_row, r.left()),
            rows.len(),
            width(rows),
        );
        state.version += 1;

        Ok(json!({
            "updates": {
                "updatedRange": written.to_string(),
                "updatedRows": rows.len(),
            }
        }))
    }

    async fn overwrite_range(&self, range: &str, rows: &[Vec<Value>]) -> Res<Value> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        let (grid, r) = state.resolve(range)?;

        if let Some(bottom) = r.bottom() {
            if r.top() + rows.len() > bottom + 1 {
                bail!("Requested writing within range [{range}], but tried writing past its last row");
            }
        }
        if r.end.is_some() && r.left() + width(rows) > r.right() + 1 {
            bail!("Requested writing within range [{range}], but tried writing past its last column");
        }
        write_cells(grid, r.top(), r.left(), rows);
        state.version += 1;

        Ok(json!({
            "totalUpdatedRows": rows.len(),
            "totalUpdatedCells": rows.iter().map(Vec::len).sum::<usize>(),
            "responses": [{ "updatedRange": range }],
        }))
    }

    async fn clear_range(&self, range: &str) -> Res<Value> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        let (grid, r) = state.resolve(range)?;

        let bottom = r.bottom().unwrap_or(usize::MAX);
        for (_, row) in grid
            .iter_mut()
            .enumerate()
            .filter(|(ix, _)| *ix >= r.top() && *ix <= bottom)
        {
            for (_, cell) in row
                .iter_mut()
                .enumerate()
                .filter(|(ix, _)| *ix >= r.left() && *ix <= r.right())
            {
                cell.clear();
            }
        }
        state.version += 1;

        Ok(json!({ "clearedRanges": [range] }))
    }
}

fn width(rows: &[Vec<Value>]) -> usize {
    rows.iter().map(Vec::len).max().unwrap_or(0)
}

/// The text Sheets shows for a raw cell: numbers without a trailing `.0`, strings as they are.
fn render(cell: &Value) -> String {
    match cell {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => f.to_string(),
            (None, None) => n.to_string(),
        },
        other => cell_to_string(other),
    }
}

/// Writes `rows` into `grid` with the top-left cell at (`top`, `left`), growing it as needed.
fn write_cells(grid: &mut Vec<Vec<String>>, top: usize, left: usize, rows: &[Vec<Value>]) {
    for (i, row) in rows.iter().enumerate() {
        let target_row = top + i;
        if grid.len() <= target_row {
            grid.resize(target_row + 1, Vec::new());
        }
        let target = &mut grid[target_row];
        for (j, value) in row.iter().enumerate() {
            let col = left + j;
            if target.len() <= col {
                target.resize(col + 1, String::new());
            }
            target[col] = render(value);
        }
    }
}

fn trim_trailing<T>(items: &mut Vec<T>, is_blank: impl Fn(&T) -> bool) {
    while items.last().is_some_and(&is_blank) {
        items.pop();
    }
}

/// Loads data from a CSV-formatted string.
fn load_csv(csv_data: &str) -> Res<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false) // Ensure headers are treated as part of the data
        .from_reader(Cursor::new(csv_data.as_bytes()));

    let mut rows: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result.context("Invalid seed CSV")?;
        rows.push(record.iter().map(|field| field.to_string()).collect());
    }
    Ok(rows)
}

/// Seed transaction data.
const SEED_DATA: &str = r##"Transaction ID,Amount,Currency,Payment Method,Purchase Date
tx-0001,87.43,USD,card,2025-10-20
tx-0002,6.75,EUR,cash,2025-10-19
"##;

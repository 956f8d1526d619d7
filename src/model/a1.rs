//! A1-notation cell and range references, e.g. `B7` or `'My Sheet'!A2:E10`.

use anyhow::{bail, Context};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A cell coordinate. Both indices are zero-based. `row` is `None` for a whole-column reference
/// such as the `ZZ` in `A:ZZ`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Cell {
    pub col: usize,
    pub row: Option<usize>,
}

impl Cell {
    pub fn new(row: usize, col: usize) -> Self {
        Self {
            col,
            row: Some(row),
        }
    }
}

/// Converts a zero-based column index to letters: 0 -> A, 25 -> Z, 26 -> AA.
pub fn col_letters(mut col: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (col % 26) as u8);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", col_letters(self.col))?;
        if let Some(row) = self.row {
            write!(f, "{}", row + 1)?;
        }
        Ok(())
    }
}

impl FromStr for Cell {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(s.len());
        let (letters, digits) = s.split_at(split);
        if letters.is_empty() {
            bail!("Cell reference '{s}' has no column letters");
        }

        let mut col: usize = 0;
        for c in letters.chars() {
            let v = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
            col = col
                .checked_mul(26)
                .and_then(|n| n.checked_add(v))
                .with_context(|| format!("Column in '{s}' is out of range"))?;
        }

        let row = if digits.is_empty() {
            None
        } else {
            let n = digits
                .parse::<usize>()
                .with_context(|| format!("Invalid row number in cell reference '{s}'"))?;
            if n == 0 {
                bail!("Row numbers start at 1, got '{s}'");
            }
            Some(n - 1)
        };

        Ok(Cell { col: col - 1, row })
    }
}

/// A rectangular range, optionally qualified by a sheet name. A range with no `end` addresses a
/// single cell, or when used as a write target, the top-left corner of the write.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Range {
    pub sheet: Option<String>,
    pub start: Cell,
    pub end: Option<Cell>,
}

impl Range {
    /// Builds the range of exactly `rows` x `cols` cells whose top-left corner is `anchor`.
    pub fn sized(sheet: Option<&str>, anchor: Cell, rows: usize, cols: usize) -> Self {
        let top = anchor.row.unwrap_or(0);
        Self {
            sheet: sheet.map(str::to_string),
            start: Cell::new(top, anchor.col),
            end: Some(Cell::new(
                top + rows.saturating_sub(1),
                anchor.col + cols.saturating_sub(1),
            )),
        }
    }

    /// The top row of the range, zero-based.
    pub fn top(&self) -> usize {
        self.start.row.unwrap_or(0)
    }

    /// The bottom row of the range, zero-based, or `None` if the range is open at the bottom.
    pub fn bottom(&self) -> Option<usize> {
        match self.end {
            Some(end) => end.row,
            None => self.start.row,
        }
    }

    pub fn left(&self) -> usize {
        self.start.col
    }

    pub fn right(&self) -> usize {
        self.end.map(|e| e.col).unwrap_or(self.start.col)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            if sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                write!(f, "{sheet}!")?;
            } else {
                write!(f, "'{}'!", sheet.replace('\'', "''"))?;
            }
        }
        write!(f, "{}", self.start)?;
        if let Some(end) = self.end {
            write!(f, ":{end}")?;
        }
        Ok(())
    }
}

impl FromStr for Range {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (sheet, cells) = match s.rfind('!') {
            Some(ix) => {
                let name = &s[..ix];
                let name = match name.strip_prefix('\'').and_then(|n| n.strip_suffix('\'')) {
                    Some(quoted) => quoted.replace("''", "'"),
                    None => name.to_string(),
                };
                if name.is_empty() {
                    bail!("Empty sheet name in range '{s}'");
                }
                (Some(name), &s[ix + 1..])
            }
            None => (None, s),
        };

        let (start, end) = match cells.split_once(':') {
            Some((a, b)) => (a.parse::<Cell>()?, Some(b.parse::<Cell>()?)),
            None => (cells.parse::<Cell>()?, None),
        };

        Ok(Range { sheet, start, end })
    }
}

impl Serialize for Range {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Range {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Range::from_str(&s).map_err(serde::de::Error::custom)
    }
}

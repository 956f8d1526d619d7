//! Direct edits of the sheet, passed through to the `Sheet` backend.

use crate::commands::Out;
use crate::error::{Error, ErrorType, IntoResult};
use crate::sync::SyncContext;
use crate::Result;
use anyhow::anyhow;
use serde_json::Value;

/// Reads the watched range. A read that does not contain a header and at least one data row is
/// an error.
pub async fn get_sheet_data(ctx: &SyncContext) -> Result<Out<Vec<Vec<String>>>> {
    let range = ctx.config().watch_range().to_string();
    let snapshot = ctx
        .sheet()
        .read_range(&range)
        .await
        .pub_result(ErrorType::RemoteSheet)?;
    if snapshot.values.len() < 2 {
        return Err(Error::new(
            ErrorType::RemoteSheet,
            anyhow!(
                "Expected a header and at least one row in {range}, got {} rows",
                snapshot.values.len()
            ),
        ));
    }
    Ok(Out::new(
        format!("Read {} rows from {range}", snapshot.values.len()),
        snapshot.values,
    ))
}

/// Appends `values` after the last row of the default sheet. Cells are written as given.
pub async fn append_data(ctx: &SyncContext, values: &[Vec<Value>]) -> Result<Out<Value>> {
    let range = ctx.config().append_range().to_string();
    let response = ctx
        .sheet()
        .append_rows(&range, values)
        .await
        .pub_result(ErrorType::RemoteSheet)?;
    Ok(Out::new(
        format!("Appended {} rows to {range}", values.len()),
        response,
    ))
}

/// Writes `values` into `range`. Cells are written as given.
pub async fn update_data(
    ctx: &SyncContext,
    range: &str,
    values: &[Vec<Value>],
) -> Result<Out<Value>> {
    let response = ctx
        .sheet()
        .overwrite_range(range, values)
        .await
        .pub_result(ErrorType::RemoteSheet)?;
    Ok(Out::new(format!("Updated {range}"), response))
}

/// Blanks every cell in `range`.
pub async fn clear_data(ctx: &SyncContext, range: &str) -> Result<Out<Value>> {
    let response = ctx
        .sheet()
        .clear_range(range)
        .await
        .pub_result(ErrorType::RemoteSheet)?;
    Ok(Out::new(format!("Cleared {range}"), response))
}

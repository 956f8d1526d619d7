use crate::api::Mode;
use crate::commands::{context, Out};
use crate::sync::{PullOutcome, PushOutcome, SheetPayload, SyncContext};
use crate::{Config, Result};
use tracing::debug;

/// Writes the database to the sheet once, without retrying the sheet write.
pub async fn manual_sync(ctx: &SyncContext) -> Result<Out<PushOutcome>> {
    let outcome = ctx.push(&[]).await?;
    let message = match outcome {
        PushOutcome::NothingToPush => "No data to sync.",
        PushOutcome::Pushed { .. } => "Data successfully synced to Google Sheets.",
    };
    Ok(Out::new(message, outcome))
}

/// Replaces the database with the rows of a payload sent by the sheet.
pub async fn update_sheet_data(
    ctx: &SyncContext,
    payload: SheetPayload,
) -> Result<Out<PullOutcome>> {
    debug!(
        "Received {} rows from sheet {:?}, range {:?}",
        payload.values.len(),
        payload.sheet_name,
        payload.range
    );
    let outcome = ctx.pull(&payload.values).await?;
    Ok(Out::new(
        "Data successfully updated in the database.",
        outcome,
    ))
}

/// `sync up`: one push from the command line.
pub async fn sync_up(config: Config, mode: Mode) -> Result<Out<PushOutcome>> {
    push_with_retries(&context(config, mode).await?).await
}

/// `sync down`: one pull of the watched range from the command line.
pub async fn sync_down(config: Config, mode: Mode) -> Result<Out<PullOutcome>> {
    pull_with_retries(&context(config, mode).await?).await
}

/// A push that retries the sheet write on the configured delays.
async fn push_with_retries(ctx: &SyncContext) -> Result<Out<PushOutcome>> {
    let outcome = ctx.push(ctx.config().retry_delays()).await?;
    let message = match &outcome {
        PushOutcome::NothingToPush => "The database is empty, nothing was written".to_string(),
        PushOutcome::Pushed { rows, range, .. } => format!("Wrote {rows} rows to {range}"),
    };
    Ok(Out::new(message, outcome))
}

async fn pull_with_retries(ctx: &SyncContext) -> Result<Out<PullOutcome>> {
    let outcome = ctx.pull_watched(ctx.config().retry_delays()).await?;
    Ok(Out::new(
        format!(
            "Replaced {} rows with {} rows from the sheet, {} skipped",
            outcome.removed, outcome.inserted, outcome.skipped
        ),
        outcome,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::SheetArgs;
    use crate::test::TestEnv;
    use crate::ErrorType;
    use serde_json::json;

    #[tokio::test]
    async fn test_manual_sync_messages() {
        let env = TestEnv::new().await;
        let ctx = env.context();
        let out = manual_sync(&ctx).await.unwrap();
        assert_eq!(out.message(), "No data to sync.");

        let payload: SheetPayload = serde_json::from_value(json!({
            "sheetName": "Sheet1",
            "values": [
                ["Transaction ID", "Amount", "Currency", "Payment Method", "Purchase Date"],
                ["T1", "9.99", "USD", "card", "2024-01-05"]
            ]
        }))
        .unwrap();
        let out = update_sheet_data(&ctx, payload).await.unwrap();
        assert_eq!(out.message(), "Data successfully updated in the database.");
        assert_eq!(out.structure().unwrap().inserted, 1);

        let out = manual_sync(&ctx).await.unwrap();
        assert_eq!(out.message(), "Data successfully synced to Google Sheets.");
    }

    #[tokio::test]
    async fn test_sync_up_and_down() {
        let env = TestEnv::new().await;
        let out = sync_down(env.config().clone(), Mode::Test).await.unwrap();
        assert_eq!(out.structure().unwrap().inserted, 2);

        // Each command opens its own in-memory sheet, so `up` writes to a fresh seeded sheet
        let out = sync_up(env.config().clone(), Mode::Test).await.unwrap();
        assert!(matches!(
            out.structure().unwrap(),
            PushOutcome::Pushed { rows: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_cli_sync_retries_on_the_configured_delays() {
        let sheet_args = SheetArgs::new(None).with_retry_delays_ms(&[1, 1]);
        let env = TestEnv::with_sheet_args(sheet_args).await;
        let ctx = env.context();

        env.sheet().fail_next(2).await;
        let out = pull_with_retries(&ctx).await.unwrap();
        assert_eq!(out.structure().unwrap().inserted, 2);

        env.sheet().fail_next(2).await;
        let out = push_with_retries(&ctx).await.unwrap();
        assert!(matches!(
            out.structure().unwrap(),
            PushOutcome::Pushed { rows: 2, .. }
        ));

        // Two retries means three attempts in all
        env.sheet().fail_next(3).await;
        let err = push_with_retries(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorType::RemoteSheet);
    }
}

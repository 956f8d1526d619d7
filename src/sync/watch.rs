//! Noticing that the sheet changed.

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// The message sent to websocket listeners when the sheet changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetUpdate {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    /// The values of the watched range after the change.
    pub data: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Update,
}

impl SheetUpdate {
    pub fn new(data: Vec<Vec<String>>) -> Self {
        Self {
            kind: UpdateKind::Update,
            data,
        }
    }
}

/// Remembers the last version tag seen. It starts out empty, so the first tag observed after
/// startup always counts as a change.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_tag: Mutex<String>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `tag` differs from the last one committed.
    pub async fn is_new(&self, tag: &str) -> bool {
        *self.last_tag.lock().await != tag
    }

    /// Records `tag` as seen. Returns false if it was already the last tag.
    pub async fn commit(&self, tag: &str) -> bool {
        let mut last = self.last_tag.lock().await;
        if *last == tag {
            return false;
        }
        *last = tag.to_string();
        true
    }

    pub async fn last_tag(&self) -> String {
        self.last_tag.lock().await.clone()
    }
}

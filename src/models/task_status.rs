use crate::core::orchestrator::ApplyState;
use camino::Utf8PathBuf;
use serde::Serialize;

/// Progress events handed to whoever drives a long-running operation.
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskStatus {
    State {
        name: String,
        state: ApplyState,
    },
    Entry {
        name: String,
        target: Utf8PathBuf,
        outcome: String,
    },
    Message {
        text: String,
    },
}

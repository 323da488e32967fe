//! Async entry points for front ends. Each call moves the blocking engine work onto the
//! blocking pool and streams [`TaskStatus`] events back through `channel`.

use crate::config::AppSettings;
use crate::core::orchestrator::{ApplyOrchestrator, ApplyReport};
use crate::core::restore_point::RestorePoint;
use crate::core::workspace::Workspace;
use crate::models::conflict::ConflictReport;
use crate::models::error::SError;
use crate::models::record::ModRecord;
use crate::models::task_status::TaskStatus;
use crate::utils::context::TaskContext;
use crate::utils::thread::{with_workspace, with_workspace_mut, WorkspaceHandle};
use camino::Utf8PathBuf;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

pub struct EngineState {
    pub workspace: WorkspaceHandle,
}

impl EngineState {
    pub fn open(settings: AppSettings) -> Result<Self, SError> {
        let ws = Workspace::open(settings)?;
        Ok(Self {
            workspace: Arc::new(Mutex::new(Some(ws))),
        })
    }
}

pub async fn import_mods(
    state: &EngineState,
    paths: Vec<Utf8PathBuf>,
    channel: UnboundedSender<TaskStatus>,
) -> Result<Vec<ModRecord>, SError> {
    info!("Starting task import");
    debug!("paths: {:?}", paths);

    let handle = state.workspace.clone();
    TaskContext::provide(channel, move || {
        with_workspace_mut(&handle, |ws| {
            let mut orchestrator = ApplyOrchestrator::new(ws);
            paths
                .iter()
                .map(|p| orchestrator.import(p))
                .collect::<Result<Vec<_>, SError>>()
        })
    })
    .await?
}

/// Without `accept_conflicts` any conflict aborts the enable with `ConflictWarning`.
pub async fn enable_mod(
    state: &EngineState,
    name: String,
    accept_conflicts: bool,
    channel: UnboundedSender<TaskStatus>,
) -> Result<ApplyReport, SError> {
    info!("Starting task enable");

    let handle = state.workspace.clone();
    TaskContext::provide(channel, move || {
        with_workspace_mut(&handle, |ws| {
            ApplyOrchestrator::new(ws).enable(&name, |_| accept_conflicts)
        })
    })
    .await?
}

pub async fn disable_mod(
    state: &EngineState,
    name: String,
    channel: UnboundedSender<TaskStatus>,
) -> Result<ApplyReport, SError> {
    info!("Starting task disable");

    let handle = state.workspace.clone();
    TaskContext::provide(channel, move || {
        with_workspace_mut(&handle, |ws| ApplyOrchestrator::new(ws).disable(&name))
    })
    .await?
}

pub async fn reorder_mod(
    state: &EngineState,
    name: String,
    position: usize,
    channel: UnboundedSender<TaskStatus>,
) -> Result<Vec<ModRecord>, SError> {
    let handle = state.workspace.clone();
    TaskContext::provide(channel, move || {
        with_workspace_mut(&handle, |ws| {
            let mut orchestrator = ApplyOrchestrator::new(ws);
            orchestrator.reorder(&name, position)?;
            Ok(orchestrator.records())
        })
    })
    .await?
}

/// `names` must list every imported mod exactly once.
pub async fn set_load_order(
    state: &EngineState,
    names: Vec<String>,
    channel: UnboundedSender<TaskStatus>,
) -> Result<Vec<ModRecord>, SError> {
    let handle = state.workspace.clone();
    TaskContext::provide(channel, move || {
        with_workspace_mut(&handle, |ws| {
            let mut orchestrator = ApplyOrchestrator::new(ws);
            orchestrator.set_order(&names)?;
            Ok(orchestrator.records())
        })
    })
    .await?
}

pub async fn reapply(
    state: &EngineState,
    channel: UnboundedSender<TaskStatus>,
) -> Result<ApplyReport, SError> {
    info!("Starting task reapply");

    let handle = state.workspace.clone();
    TaskContext::provide(channel, move || {
        with_workspace_mut(&handle, |ws| ApplyOrchestrator::new(ws).reapply())
    })
    .await?
}

pub async fn rollback(
    state: &EngineState,
    id: String,
    channel: UnboundedSender<TaskStatus>,
) -> Result<ApplyReport, SError> {
    info!("Starting task rollback");

    let handle = state.workspace.clone();
    TaskContext::provide(channel, move || {
        with_workspace_mut(&handle, |ws| ApplyOrchestrator::new(ws).rollback(&id))
    })
    .await?
}

pub async fn remove_mods(
    state: &EngineState,
    names: Vec<String>,
    channel: UnboundedSender<TaskStatus>,
) -> Result<(), SError> {
    info!("Starting task remove");
    debug!("names: {:?}", names);

    let handle = state.workspace.clone();
    TaskContext::provide(channel, move || {
        with_workspace_mut(&handle, |ws| {
            let mut orchestrator = ApplyOrchestrator::new(ws);
            names.iter().try_for_each(|name| orchestrator.remove(name))
        })
    })
    .await?
}

pub fn list_mods(state: &EngineState) -> Result<Vec<ModRecord>, SError> {
    with_workspace(&state.workspace, |ws| ws.registry.records().to_vec())
}

pub fn preview_conflicts(state: &EngineState, name: Option<&str>) -> Result<ConflictReport, SError> {
    with_workspace_mut(&state.workspace, |ws| {
        ApplyOrchestrator::new(ws).preview_conflicts(name)
    })
}

pub fn list_restore_points(state: &EngineState) -> Result<Vec<RestorePoint>, SError> {
    with_workspace(&state.workspace, |ws| ws.restore_points.list())?
}

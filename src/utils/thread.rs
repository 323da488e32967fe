use crate::core::workspace::Workspace;
use crate::models::error::SError;
use parking_lot::Mutex;
use std::sync::Arc;

pub type WorkspaceHandle = Arc<Mutex<Option<Workspace>>>;

/// Runs `f` while holding the workspace exclusively. Every mutating operation goes through
/// here, so two enable/disable runs can never interleave on the same target tree.
pub fn with_workspace_mut<F, R>(handle: &WorkspaceHandle, f: F) -> Result<R, SError>
where
    F: FnOnce(&mut Workspace) -> Result<R, SError>,
{
    let mut guard = handle.lock();
    let ws = guard.as_mut().ok_or(SError::NoActiveWorkspace)?;
    f(ws)
}

pub fn with_workspace<F, R>(handle: &WorkspaceHandle, f: F) -> Result<R, SError>
where
    F: FnOnce(&Workspace) -> R,
{
    let guard = handle.lock();
    let ws = guard.as_ref().ok_or(SError::NoActiveWorkspace)?;
    Ok(f(ws))
}

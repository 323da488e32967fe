pub mod conflict;
pub mod error;
pub mod manifest;
pub mod paths;
pub mod record;
pub mod task_status;

pub mod conflict;
pub mod decompression;
pub mod executor;
pub mod mod_backup;
pub mod mod_stager;
pub mod orchestrator;
pub mod registry;
pub mod restore_point;
pub mod security;
pub mod target;
pub mod validator;
pub mod workspace;

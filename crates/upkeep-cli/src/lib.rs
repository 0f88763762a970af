//! Workspace file loading for the `upkeep` binary.

pub mod workspace;

pub use workspace::{
    DeploySection, ScannerSection, TaskAction, Workspace, WorkspaceTask, WebhookSection,
};

//! upkeep-ci: collaborators that do real work for the upkeep control plane
//!
//! Provides:
//! - A command-per-suite executor with timeout and stdout parsing
//! - Command-backed deploy targets, vulnerability scanners and tasks
//! - A webhook notification channel
//! - The builtin six-suite catalog

pub mod catalog;
pub mod deploy;
pub mod executor;
pub mod process;
pub mod scan;
pub mod task;
pub mod webhook;

// Re-export key types
pub use catalog::builtin_suites;
pub use deploy::CommandDeployTarget;
pub use executor::{parse_suite_output, CommandSuiteExecutor, SuiteCommand};
pub use process::{run_command, CommandOutput};
pub use scan::CommandScanner;
pub use task::CommandAction;
pub use webhook::WebhookNotifier;

//! Settings management
//!
//! Loads and merges settings from two sources:
//! - User settings: `~/.cc-worker/settings.json` (or `$CC_WORKER_HOME/settings.json`)
//! - Project settings: `<cwd>/.cc-worker/settings.json`
//!
//! Priority: Project > User

mod manager;

pub use manager::{Settings, SettingsManager};

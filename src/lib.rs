//! Reference profile status for a mod-manager host: a profile can name another
//! profile of the same game as its reference, and the mods table shows and
//! edits each mod's enablement in that reference.

pub mod app;
pub mod cli;
pub mod config;
pub mod enablement;
pub mod extension;
pub mod host;
pub mod library;
pub mod logging;
pub mod notifier;
pub mod reference;
pub mod selector;
pub mod store;
pub mod ui;

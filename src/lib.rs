//! Channel bookmark editing: a session state machine that resolves link
//! previews and uploads files while it reconciles edits against the saved
//! record, plus the local store and adapters the `bmedit` binary runs on.

pub mod config;
pub mod editor;
pub mod progress;
pub mod services;
pub mod store;

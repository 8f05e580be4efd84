//! Configuration management for minglog.
//!
//! Settings are read from a TOML file in the XDG config directory
//! (`~/.config/minglog/config.toml`, or `$MINGLOG_CONFIG_DIR/config.toml`).
//! Every key is optional; [`LinkGraphSettings`] is the resolved form with
//! defaults filled in, which is what the link subsystem consumes.
//!
//! ```toml
//! [links]
//! database_path = "/home/me/.local/share/minglog/links.sqlite3"
//! bidirectional = true
//! cache_capacity = 500
//!
//! [sync]
//! interval_seconds = 30
//! auto_fix = true
//!
//! [checker]
//! similarity_threshold = 0.6
//!
//! [logging]
//! level = "info"
//! ```

pub mod links;
mod settings;

pub use links::{CheckerSettings, LinkGraphSettings, SyncSettings};
pub use settings::{
    CheckerToml, LinksToml, LoggingSettings, Settings, SettingsError, SyncToml,
};

/// Load .env file if it exists.
pub fn load_dotenv() {
    // Missing .env is the common case
    let _ = dotenvy::dotenv();
}

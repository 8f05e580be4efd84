pub mod config;

pub use config::{
    CheckerSettings, CheckerToml, LinkGraphSettings, LinksToml, LoggingSettings,
    Settings, SettingsError, SyncSettings, SyncToml, load_dotenv,
};

//! User-editable map settings, persisted separately from tile data.

mod model;
mod store;

pub use model::{MapSettings, MAX_SETTINGS_ZOOM};
pub use store::{
    validate_realm, FileSettingsBackend, MemorySettingsBackend, SettingsBackend, SettingsStore,
    DEFAULT_REALM,
};

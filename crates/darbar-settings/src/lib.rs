//! # darbar-settings
//!
//! Settings are loaded from layered sources (later wins):
//! 1. **Compiled defaults**: [`DarbarSettings::default()`]
//! 2. **User file**: `~/.darbar/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `PORT`, `DARBAR_*`
//!
//! ```no_run
//! let settings = darbar_settings::load_settings().unwrap_or_default();
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{darbar_home, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = DarbarSettings::default();
        let _path = settings_path();
        let merged = deep_merge(serde_json::json!({"x": 1}), serde_json::json!({"y": 2}));
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 2);
    }
}

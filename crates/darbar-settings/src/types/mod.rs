//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a settings file only needs the keys it changes.

mod server;

pub use server::*;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::loader::darbar_home;

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "scripture": { "database": "/srv/gurbani.sqlite" },
///   "logging": { "level": "debug", "json": false }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DarbarSettings {
    pub server: ServerSettings,
    pub scripture: ScriptureSettings,
    pub logging: LoggingSettings,
}

impl DarbarSettings {
    /// Pull every numeric setting into its supported range, logging each
    /// adjustment.
    pub fn validate(&mut self) {
        self.server.clamp();
        server::clamp_field("scripture.searchLimit", &mut self.scripture.search_limit, 1, 500);
    }
}

/// Scripture database settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptureSettings {
    /// Path to the SQLite scripture database. Defaults to
    /// `~/.darbar/scripture.sqlite`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Maximum number of search matches returned per query.
    pub search_limit: usize,
}

impl Default for ScriptureSettings {
    fn default() -> Self {
        Self {
            database: None,
            search_limit: 50,
        }
    }
}

impl ScriptureSettings {
    pub fn database_path(&self) -> PathBuf {
        match &self.database {
            Some(path) => PathBuf::from(path),
            None => darbar_home().join("scripture.sqlite"),
        }
    }
}

/// Log output settings. `RUST_LOG` takes precedence over all of these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Base filter level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-target level overrides, e.g. `{"darbar_store": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            modules: BTreeMap::new(),
        }
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use darbar_core::scripture::ScriptureSource;
use darbar_settings::DarbarSettings;
use darbar_store::SqliteScripture;
use darbar_telemetry::TelemetryConfig;

/// Live scripture presentation sync server.
#[derive(Debug, Parser)]
#[command(name = "darbar", version)]
struct Cli {
    /// Port to listen on (overrides settings and `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Bind address.
    #[arg(long)]
    host: Option<String>,

    /// Path to the SQLite scripture database.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Settings file (defaults to `~/.darbar/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, settings: &mut DarbarSettings) {
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(database) = &self.database {
            settings.scripture.database = Some(database.display().to_string());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(darbar_settings::settings_path);
    let mut settings = darbar_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;
    cli.apply(&mut settings);
    settings.validate();

    let telemetry = darbar_telemetry::init_telemetry(TelemetryConfig {
        log_level: settings.logging.level.clone(),
        module_levels: settings
            .logging
            .modules
            .iter()
            .map(|(module, level)| (module.clone(), level.clone()))
            .collect(),
        json: settings.logging.json,
    });

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting Darbar");

    let db_path = settings.scripture.database_path();
    let source = SqliteScripture::open_or_empty(&db_path, settings.scripture.search_limit)
        .with_context(|| format!("opening scripture database {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "scripture database ready");
    let source: Arc<dyn ScriptureSource> = Arc::new(source);

    let handle = darbar_server::start((&settings.server).into(), source, telemetry.metrics())
        .await
        .context("failed to start server")?;
    tracing::info!(port = handle.port, "Darbar server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    handle.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "darbar",
            "--port",
            "9999",
            "--host",
            "127.0.0.1",
            "--database",
            "/srv/gurbani.sqlite",
        ]);
        let mut settings = DarbarSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 9999);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(
            settings.scripture.database_path(),
            PathBuf::from("/srv/gurbani.sqlite")
        );
    }

    #[test]
    fn cli_without_flags_keeps_settings() {
        let cli = Cli::parse_from(["darbar"]);
        let mut settings = DarbarSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings, DarbarSettings::default());
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use biglinux_settings::config::loader::list_json_files;
use biglinux_settings::config::register_manifest;
use biglinux_settings::{
    EngineSettings, LogCollector, PageManifest, PanelController, PanelEvent, ProcessRunner,
    SettingsManager, ToggleRegistry, ToggleSnapshot,
};

/// Headless run: load the pages, synchronize once and print every toggle.
///
/// Usage: `biglinux_settings [page.json ...]`. Without arguments the pages
/// are read from `<scripts_base_dir>/pages/`.
#[tokio::main]
async fn main() -> biglinux_settings::Result<()> {
    // =========================================================================
    // SETTINGS
    // =========================================================================
    let settings = match SettingsManager::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("[Main] WARNING: invalid settings, using defaults: {}", e);
            EngineSettings::default()
        }
    };

    // =========================================================================
    // LOGGING - MUST COME BEFORE ANY SCRIPT RUNS
    // =========================================================================
    let level = if settings.debug_logging {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let log_collector = LogCollector::new(settings.resolved_log_dir(), None)
        .map_err(|e| format!("LogCollector initialization failed: {}", e))?
        .with_level(level);
    if let Err(e) = log_collector.install_global() {
        eprintln!("[Main] WARNING: Failed to set LogCollector as global logger: {}", e);
    }
    log::info!("BigLinux Settings engine {} starting", biglinux_settings::VERSION);

    // =========================================================================
    // PAGES
    // =========================================================================
    let args: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    let manifest_paths = if args.is_empty() {
        list_json_files(&settings.scripts_dir().join("pages"))?
    } else {
        args
    };

    let mut registry = ToggleRegistry::with_default_timeout(settings.default_toggle_timeout());
    for path in &manifest_paths {
        let manifest = PageManifest::load(path)?;
        register_manifest(&mut registry, &manifest, &settings.scripts_dir())?;
    }
    if registry.is_empty() {
        println!("No toggles registered.");
        log_collector.wait_for_empty().await?;
        return Ok(());
    }

    // =========================================================================
    // SYNC
    // =========================================================================
    let (controller, mut events_rx) =
        PanelController::new(registry, Arc::new(ProcessRunner::new()), &settings);

    let drain = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                PanelEvent::Notice(text) => log::warn!("[Main] notice: {}", text),
                PanelEvent::SyncCompleted => log::debug!("[Main] sync completed"),
                _ => {}
            }
        }
    });

    let report = controller.sync_now().await;
    print_table(&report.snapshots);
    println!(
        "\n{} available, {} locked, {} unavailable ({} ms)",
        report.available,
        report.locked,
        report.unavailable,
        report.elapsed.as_millis()
    );

    // =========================================================================
    // SHUTDOWN
    // =========================================================================
    drop(controller);
    if let Err(e) = drain.await {
        log::warn!("[Main] event drain task failed: {}", e);
    }
    log::info!("BigLinux Settings engine finished");
    if let Err(e) = log_collector.wait_for_empty().await {
        eprintln!("[Main] WARNING: Failed to flush logs: {}", e);
    }
    Ok(())
}

fn print_table(snapshots: &[ToggleSnapshot]) {
    println!("{:<32} {:<8} {:<12} {:<8} {}", "TOGGLE", "STATE", "AVAILABILITY", "VISIBLE", "MESSAGE");
    for s in snapshots {
        println!(
            "{:<32} {:<8} {:<12} {:<8} {}",
            s.title,
            s.display_state.as_str(),
            s.availability.as_str(),
            if s.visible { "yes" } else { "no" },
            s.message.as_deref().unwrap_or("")
        );
    }
}

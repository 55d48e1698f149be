//! Gantry - profile-driven plugin host.
//!
//! Loads the plugins a profile declares, wires them to the shared state
//! store and event bus, and reports what they contributed.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gantry::plugin::{register_builtin_factories, PluginManifest, MANIFEST_FILE};
use gantry::profile::Profile;
use gantry::Shell;

/// Profile-driven plugin host
#[derive(Parser)]
#[command(name = "gantry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a profile, run its plugins, and report their contributions
    Run {
        /// Path to the profile document
        profile: PathBuf,

        /// Skip restoring the saved view state
        #[arg(long)]
        no_restore: bool,
    },

    /// List the plugins a profile declares without loading them
    Inspect {
        /// Path to the profile document
        profile: PathBuf,
    },

    /// Validate a plugin manifest
    Validate {
        /// Plugin directory (or a plugin.toml file)
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "gantry=debug" } else { "gantry=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Run { profile, no_restore } => run(&profile, no_restore).await,
        Commands::Inspect { profile } => inspect(&profile),
        Commands::Validate { path } => validate(&path),
    }
}

async fn run(profile: &Path, no_restore: bool) -> Result<()> {
    let shell = Shell::new();
    register_builtin_factories(shell.factories());

    let report = shell.load_profile(profile)?;
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for (unit, error) in &report.failed {
        println!("failed:  {unit}: {error}");
    }
    for info in shell.plugins().loaded_plugins() {
        let title = info.title.unwrap_or_else(|| info.name.clone());
        println!("loaded:  {} v{} ({title})", info.name, info.version);
    }

    if no_restore {
        shell.host().open_all_views();
    } else {
        shell.restore_views(profile);
    }
    shell
        .bus()
        .publish("app.ready", json!({ "plugins": report.loaded }))
        .await;

    for view in shell.host().open_views() {
        println!("view:    {}/{}", view.plugin, view.view_id);
    }
    if let Some(status) = shell.host().status() {
        println!("status:  {}", status.message);
    }

    shell.save_views(profile)?;
    shell.bus().publish("app.closing", json!({})).await;
    shell.shutdown();
    Ok(())
}

fn inspect(profile_path: &Path) -> Result<()> {
    let profile = Profile::load(profile_path)?;
    if let Some(title) = &profile.profile.title {
        println!("profile: {title}");
    }

    for git in &profile.plugins.git {
        println!("source:  {} (git, unsupported)", git.url);
    }
    for dir in &profile.plugins.local {
        match PluginManifest::from_file(&dir.join(MANIFEST_FILE)) {
            Ok(manifest) => {
                println!(
                    "plugin:  {} v{} ({})",
                    manifest.metadata.name,
                    manifest.metadata.version,
                    manifest.metadata.entry_point
                );
                for (dependency, requirement) in &manifest.dependencies {
                    println!("         requires {dependency} {requirement}");
                }
            }
            Err(e) => println!("invalid: {}: {e}", dir.display()),
        }
    }
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    let manifest_path =
        if path.is_dir() { path.join(MANIFEST_FILE) } else { path.to_path_buf() };
    let manifest = PluginManifest::from_file(&manifest_path)?;
    manifest.validate()?;
    println!(
        "ok: {} v{} ({})",
        manifest.metadata.name, manifest.metadata.version, manifest.metadata.entry_point
    );
    Ok(())
}

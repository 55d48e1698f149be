//! Plugin lifecycle manager.
//!
//! Turns a declarative profile into live plugin instances and tears them
//! down cleanly. Per plugin the pipeline is: manifest read and validation,
//! dependency resolution (semver-checked, topologically ordered),
//! entry-point resolution against the factory registry, capability
//! screening, instantiation and `on_load` inside the isolation boundary.
//! A failure anywhere aborts that plugin only; the rest of the profile
//! keeps loading.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use semver::{Version, VersionReq};
use tracing::{error, info, warn};

use super::context::{Plugin, PluginContext};
use super::manifest::{PluginManifest, MANIFEST_FILE};
use super::registry::FactoryRegistry;
use super::sandbox::IsolationBoundary;
use super::{PluginError, PluginResult};
use crate::bus::EventBus;
use crate::host::HostShell;
use crate::profile::{Profile, ProfileResult};
use crate::security::{DenyList, PermissionSet};
use crate::state::StateManager;

/// Package name under which the host's plugin API is provided to
/// dependency checks.
pub const HOST_PACKAGE: &str = "gantry-api";

/// Metadata snapshot of a loaded plugin.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub name: String,
    pub version: Version,
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub dependencies: BTreeMap<String, String>,
    pub permissions: PermissionSet,
}

/// A live plugin instance plus its metadata.
pub struct LoadedPlugin {
    pub info: PluginInfo,
    instance: Mutex<Box<dyn Plugin>>,
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin").field("info", &self.info).finish_non_exhaustive()
    }
}

/// Outcome of a profile load. Per-plugin failures land here instead of
/// failing the whole operation.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Names that reached the loaded state, in load order.
    pub loaded: Vec<String>,
    /// Per-unit failures, keyed by plugin name or source path.
    pub failed: Vec<(String, PluginError)>,
    /// Non-fatal findings (duplicates skipped, overrides applied, ...).
    pub warnings: Vec<String>,
}

#[derive(Default)]
struct LiveRegistry {
    /// Insertion order, for strict reverse-order unload.
    order: Vec<String>,
    by_name: HashMap<String, Arc<LoadedPlugin>>,
}

/// A discovered plugin source awaiting load.
struct Discovered {
    name: String,
    manifest: PluginManifest,
}

/// Manages plugin discovery, dependency checking, instantiation, and the
/// load/unload lifecycle.
pub struct PluginManager {
    state: Arc<StateManager>,
    bus: Arc<EventBus>,
    host: Arc<dyn HostShell>,
    factories: Arc<FactoryRegistry>,
    deny: DenyList,
    /// Packages the host provides for dependency resolution.
    provided: Mutex<BTreeMap<String, Version>>,
    registry: Mutex<LiveRegistry>,
}

impl PluginManager {
    pub fn new(
        state: Arc<StateManager>,
        bus: Arc<EventBus>,
        host: Arc<dyn HostShell>,
        factories: Arc<FactoryRegistry>,
    ) -> Self {
        let mut provided = BTreeMap::new();
        provided.insert(
            HOST_PACKAGE.to_string(),
            Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or_else(|_| Version::new(0, 0, 0)),
        );
        Self {
            state,
            bus,
            host,
            factories,
            deny: DenyList::default(),
            provided: Mutex::new(provided),
            registry: Mutex::new(LiveRegistry::default()),
        }
    }

    /// Replace the capability deny-list.
    pub fn with_deny_list(mut self, deny: DenyList) -> Self {
        self.deny = deny;
        self
    }

    /// Advertise a host-provided package for dependency resolution.
    pub fn provide_package(&self, name: &str, version: Version) {
        self.provided.lock().insert(name.to_string(), version);
    }

    /// Load every plugin a profile declares.
    ///
    /// Only a missing or malformed profile fails the call; anything going
    /// wrong with an individual plugin is reported in the [`LoadReport`].
    pub fn load_profile(&self, path: &Path) -> ProfileResult<LoadReport> {
        let profile = Profile::load(path)?;
        info!(path = %path.display(), "loading profile");
        let mut report = LoadReport::default();

        for git in &profile.plugins.git {
            let message =
                format!("git plugin source '{}' is not supported, skipped", git.url);
            warn!(url = git.url, "git plugin sources are not supported");
            report.warnings.push(message);
        }

        let discovered = self.discover(&profile, &mut report);
        let (ordered, stuck) = sort_by_dependencies(discovered);

        if !stuck.is_empty() {
            warn!(plugins = ?stuck, "dependency cycle detected");
            for name in &stuck {
                report
                    .failed
                    .push((name.clone(), PluginError::DependencyCycle(stuck.clone())));
            }
        }

        for item in ordered {
            match self.load_one(&item.manifest, &profile, &mut report.warnings) {
                Ok(()) => report.loaded.push(item.name),
                Err(e) => {
                    error!(plugin = item.name, error = %e, "failed to load plugin");
                    report.failed.push((item.name, e));
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "profile load complete"
        );
        Ok(report)
    }

    /// Unload every plugin, in strict reverse load order. Each plugin is
    /// removed from the registry before its `on_unload` runs; a faulty
    /// hook is logged and does not stop the rest.
    pub fn unload_all(&self) {
        info!("unloading all plugins");
        loop {
            let plugin = {
                let mut registry = self.registry.lock();
                match registry.order.pop() {
                    Some(name) => registry.by_name.remove(&name),
                    None => break,
                }
            };
            let Some(plugin) = plugin else { continue };

            let boundary = IsolationBoundary::new(&plugin.info.name);
            let result = boundary.run("on_unload", || {
                plugin.instance.lock().on_unload();
                Ok(())
            });
            match result {
                Ok(()) => info!(plugin = plugin.info.name, "plugin unloaded"),
                Err(e) => error!(plugin = plugin.info.name, error = %e, "unload failed"),
            }
        }
    }

    /// A loaded plugin by name.
    pub fn get_plugin(&self, name: &str) -> Option<Arc<LoadedPlugin>> {
        self.registry.lock().by_name.get(name).cloned()
    }

    /// Whether a plugin name is currently loaded.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.registry.lock().by_name.contains_key(name)
    }

    /// Metadata snapshot of the loaded plugins, in load order.
    pub fn loaded_plugins(&self) -> Vec<PluginInfo> {
        let registry = self.registry.lock();
        registry
            .order
            .iter()
            .filter_map(|name| registry.by_name.get(name))
            .map(|plugin| plugin.info.clone())
            .collect()
    }

    /// Number of loaded plugins.
    pub fn count(&self) -> usize {
        self.registry.lock().by_name.len()
    }

    /// Read every local source's manifest, rejecting invalid manifests and
    /// duplicate names (first discovered wins).
    fn discover(&self, profile: &Profile, report: &mut LoadReport) -> Vec<Discovered> {
        let mut discovered: Vec<Discovered> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for dir in &profile.plugins.local {
            let unit = dir.display().to_string();
            if !dir.is_dir() {
                warn!(path = %dir.display(), "local plugin path is not a directory");
                report.failed.push((unit, PluginError::NotFound(dir.clone())));
                continue;
            }

            let manifest_path = dir.join(MANIFEST_FILE);
            if !manifest_path.is_file() {
                report.failed.push((unit, PluginError::NotFound(manifest_path)));
                continue;
            }

            let manifest = match PluginManifest::from_file(&manifest_path)
                .and_then(|manifest| manifest.validate().map(|()| manifest))
            {
                Ok(manifest) => manifest,
                Err(e) => {
                    error!(path = %manifest_path.display(), error = %e, "invalid manifest");
                    report.failed.push((unit, e));
                    continue;
                }
            };

            let name = manifest.metadata.name.clone();
            if seen.contains(&name) || self.is_loaded(&name) {
                warn!(plugin = name, path = %dir.display(), "duplicate plugin, first wins");
                report.warnings.push(format!(
                    "duplicate plugin '{name}' from {}, keeping the first",
                    dir.display()
                ));
                continue;
            }
            info!(plugin = name, path = %dir.display(), "discovered plugin");
            seen.insert(name.clone());
            discovered.push(Discovered { name, manifest });
        }
        discovered
    }

    /// Drive one plugin through dependency check, entry-point resolution,
    /// capability screening, instantiation, and `on_load`.
    fn load_one(
        &self,
        manifest: &PluginManifest,
        profile: &Profile,
        warnings: &mut Vec<String>,
    ) -> PluginResult<()> {
        let name = manifest.metadata.name.clone();
        let version = manifest.version()?;
        if self.is_loaded(&name) {
            return Err(PluginError::DuplicateName(name));
        }
        info!(plugin = name, version = %version, "loading plugin");

        self.check_dependencies(&name, manifest, profile, warnings)?;

        let entry_point = &manifest.metadata.entry_point;
        let factory = self.factories.resolve(entry_point).ok_or_else(|| {
            PluginError::UnknownEntryPoint {
                plugin: name.clone(),
                entry_point: entry_point.clone(),
            }
        })?;

        let mut declared = manifest.metadata.capabilities.clone();
        declared.extend(factory.capabilities());
        let offending = self.deny.screen(&name, declared.iter().map(String::as_str));
        if !offending.is_empty() {
            return Err(PluginError::CapabilityDenied {
                plugin: name,
                capabilities: offending,
            });
        }

        let context = PluginContext::new(
            &name,
            version.clone(),
            profile.plugin_config(&name),
            manifest.permissions.clone(),
            self.state.clone(),
            self.bus.clone(),
            self.host.clone(),
        );

        let boundary = IsolationBoundary::new(&name);
        let mut instance = boundary.run("construct", || factory.create(context))?;
        boundary.run("on_load", || {
            instance.on_load().map_err(|e| PluginError::Lifecycle {
                plugin: name.clone(),
                phase: "on_load".to_string(),
                message: e.to_string(),
            })
        })?;

        let info = PluginInfo {
            name: name.clone(),
            version: version.clone(),
            title: manifest.metadata.title.clone(),
            author: manifest.metadata.author.clone(),
            description: manifest.metadata.description.clone(),
            dependencies: manifest.dependencies.clone(),
            permissions: manifest.permissions.clone(),
        };
        let mut registry = self.registry.lock();
        registry.order.push(name.clone());
        registry
            .by_name
            .insert(name.clone(), Arc::new(LoadedPlugin { info, instance: Mutex::new(instance) }));
        info!(plugin = name, version = %version, "plugin loaded");
        Ok(())
    }

    /// Resolve every declared dependency: profile overrides take precedence
    /// over the plugin's declaration, then the installed version (a loaded
    /// plugin or a host-provided package) must satisfy the semver range.
    fn check_dependencies(
        &self,
        plugin: &str,
        manifest: &PluginManifest,
        profile: &Profile,
        warnings: &mut Vec<String>,
    ) -> PluginResult<()> {
        for (dependency, declared) in &manifest.dependencies {
            let mut required = declared.clone();
            if let Some(pinned) = profile.plugins.dependencies.get(dependency) {
                if pinned != declared {
                    warn!(
                        plugin,
                        dependency,
                        pinned,
                        declared,
                        "profile pins a different dependency requirement"
                    );
                    warnings.push(format!(
                        "dependency '{dependency}' of '{plugin}': profile pins '{pinned}' \
                         over declared '{declared}'"
                    ));
                }
                required = pinned.clone();
            }

            let requirement = VersionReq::parse(&required).map_err(|e| {
                PluginError::InvalidManifest(format!(
                    "requirement '{required}' for dependency '{dependency}' is not semver: {e}"
                ))
            })?;

            let installed = self.resolve_installed(dependency).ok_or_else(|| {
                PluginError::MissingDependency {
                    plugin: plugin.to_string(),
                    dependency: dependency.clone(),
                    required: required.clone(),
                }
            })?;

            if !requirement.matches(&installed) {
                return Err(PluginError::IncompatibleDependency {
                    plugin: plugin.to_string(),
                    dependency: dependency.clone(),
                    required,
                    installed: installed.to_string(),
                });
            }
        }
        Ok(())
    }

    /// The installed version a dependency name resolves to: a loaded
    /// plugin's version, or a host-provided package.
    fn resolve_installed(&self, dependency: &str) -> Option<Version> {
        if let Some(plugin) = self.get_plugin(dependency) {
            return Some(plugin.info.version.clone());
        }
        self.provided.lock().get(dependency).cloned()
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager").field("loaded", &self.count()).finish_non_exhaustive()
    }
}

/// Order discovered plugins so that every plugin-to-plugin dependency
/// loads before its dependent. Dependencies naming something that is not a
/// discovered plugin are resolved later, against loaded plugins and
/// provided packages.
///
/// Returns the ordered list plus the names that could not be scheduled
/// (cycle participants and their dependents), in discovery order.
fn sort_by_dependencies(discovered: Vec<Discovered>) -> (Vec<Discovered>, Vec<String>) {
    let names: HashSet<String> = discovered.iter().map(|d| d.name.clone()).collect();
    let mut remaining = discovered;
    let mut ordered = Vec::new();
    let mut emitted: HashSet<String> = HashSet::new();

    loop {
        let mut progressed = false;
        let mut index = 0;
        while index < remaining.len() {
            let ready = remaining[index]
                .manifest
                .dependencies
                .keys()
                .filter(|dependency| names.contains(*dependency))
                .all(|dependency| emitted.contains(dependency));
            if ready {
                let item = remaining.remove(index);
                emitted.insert(item.name.clone());
                ordered.push(item);
                progressed = true;
            } else {
                index += 1;
            }
        }
        if !progressed {
            break;
        }
    }

    let stuck = remaining.into_iter().map(|d| d.name).collect();
    (ordered, stuck)
}

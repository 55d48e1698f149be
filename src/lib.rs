//! # Gantry
//!
//! A profile-driven plugin host: Gantry loads plugin modules declared in a
//! TOML profile, wires them to a shared reactive state store and an
//! asynchronous event bus, and lets them contribute UI surfaces (views,
//! menu actions, toolbar items, status messages) through a host
//! registration API — without compile-time knowledge of any particular
//! plugin beyond its registered factory.
//!
//! ## Architecture
//!
//! - [`bus::EventBus`] — topic pub/sub with prefix wildcards, sync and
//!   async handlers, per-handler fault isolation.
//! - [`state::StateManager`] — dotted-path key-value store with glob
//!   change subscriptions, backed by [`state::HistoryManager`] for
//!   undo/redo with transactional grouping.
//! - [`plugin::PluginManager`] — manifest discovery, semver dependency
//!   resolution with topological ordering, capability screening, and
//!   panic-contained lifecycle hooks.
//! - [`host::HostShell`] — the registration surface plugins contribute UI
//!   through; [`host::HeadlessHost`] is the toolkit-free implementation.
//! - [`app::Shell`] — wires the above into one application instance.
//!
//! ## Quick start
//!
//! ```no_run
//! use gantry::plugin::register_builtin_factories;
//! use gantry::Shell;
//!
//! let shell = Shell::new();
//! register_builtin_factories(shell.factories());
//! let report = shell.load_profile(std::path::Path::new("profile.toml")).unwrap();
//! println!("loaded: {:?}", report.loaded);
//! shell.shutdown();
//! ```

#![forbid(unsafe_code)]

pub mod app;
pub mod bus;
mod fault;
pub mod host;
pub mod plugin;
pub mod profile;
pub mod security;
pub mod state;

pub use app::Shell;

//! Package Loader
//!
//! Reads package TOML files from disk. A package is either a single file
//! `packages/<name>.toml` or a directory `packages/<name>/` whose `*.toml`
//! files are merged. Supports hot-reloading during development.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::{PackageSet, PackageSources, RawPackage};
use crate::error::LoadError;
use crate::registry::ComponentRegistry;
use crate::runtime::QuestRuntime;

pub struct PackageLoader {
    packages_dir: PathBuf,
}

impl PackageLoader {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            packages_dir: data_dir.join("packages"),
        }
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    /// Read every package from disk. A file that fails to parse is skipped
    /// with a warning; only an unreadable package directory is an error.
    pub fn read_sources(&self) -> Result<PackageSources, LoadError> {
        info!("Loading packages from {:?}", self.packages_dir);
        let mut sources = PackageSources::new();

        if !self.packages_dir.exists() {
            warn!("Package directory does not exist: {:?}", self.packages_dir);
            return Ok(sources);
        }

        let mut entries = read_dir_sorted(&self.packages_dir)?;
        entries.retain(|path| path.is_dir() || is_toml(path));

        for path in entries {
            let Some(name) = package_name(&path) else {
                warn!("Skipping {:?}: not a valid package name", path);
                continue;
            };
            if sources.get(&name).is_some() {
                warn!("{}", LoadError::DuplicatePackage { name, path });
                continue;
            }

            let mut files = Vec::new();
            if path.is_dir() {
                collect_toml_files(&path, &mut files)?;
            } else {
                files.push(path);
            }

            let mut package = RawPackage::default();
            for file in files {
                match read_package_file(&file) {
                    Ok(raw) => {
                        for (kind, duplicate) in package.merge(raw) {
                            warn!(
                                "Package '{}' declares {} '{}' twice, using the one from {:?}",
                                name, kind, duplicate, file
                            );
                        }
                    }
                    Err(e) => warn!("Failed to load package file: {}", e),
                }
            }
            info!("Read package '{}' ({} definitions)", name, package.len());
            sources.insert(&name, package);
        }

        Ok(sources)
    }

    /// Read and compile all packages
    pub fn load(&self, registry: &ComponentRegistry) -> Result<PackageSet, LoadError> {
        Ok(PackageSet::compile(self.read_sources()?, registry))
    }

    /// Load from disk and swap the result into a running runtime.
    /// Returns how many definitions failed to load.
    pub fn reload(&self, rt: &QuestRuntime) -> Result<usize, LoadError> {
        let set = self.load(rt.registry())?;
        let failed = set.diagnostics().len();
        rt.replace_packages(set);
        Ok(failed)
    }

    /// Start file watcher for hot-reload
    /// Returns a channel receiver that signals when reloads occur
    pub fn start_file_watcher(
        self: &Arc<Self>,
        rt: Arc<QuestRuntime>,
    ) -> tokio::sync::mpsc::Receiver<HotReloadEvent> {
        use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let loader = Arc::clone(self);

        std::thread::spawn(move || {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut watcher = match RecommendedWatcher::new(
                move |res: Result<notify::Event, notify::Error>| {
                    if let Ok(event) = res {
                        let _ = notify_tx.send(event);
                    }
                },
                Config::default().with_poll_interval(Duration::from_secs(1)),
            ) {
                Ok(w) => w,
                Err(e) => {
                    error!("Failed to create file watcher: {}", e);
                    return;
                }
            };

            if let Err(e) = watcher.watch(&loader.packages_dir, RecursiveMode::Recursive) {
                error!("Failed to watch package directory: {}", e);
                return;
            }
            info!("Package hot-reload watcher started for {:?}", loader.packages_dir);

            while let Ok(event) = notify_rx.recv() {
                let relevant = matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) && event.paths.iter().any(|p| is_toml(p) || p.is_dir());
                if !relevant {
                    continue;
                }

                // Editors write in bursts; settle before reloading once
                while notify_rx.recv_timeout(Duration::from_millis(200)).is_ok() {}

                let changed = event
                    .paths
                    .first()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default();
                info!("Detected change in {}, reloading packages", changed);

                let message = match loader.reload(&rt) {
                    Ok(failed) => {
                        info!("Hot-reload completed ({} definitions failed)", failed);
                        HotReloadEvent::Reloaded { path: changed, failed }
                    }
                    Err(e) => {
                        error!("Hot-reload failed: {}", e);
                        HotReloadEvent::Error(e.to_string())
                    }
                };
                if tx.blocking_send(message).is_err() {
                    break;
                }
            }
        });

        rx
    }
}

/// Events from the hot-reload watcher
#[derive(Debug, Clone)]
pub enum HotReloadEvent {
    /// Packages were reloaded after a change to `path`
    Reloaded { path: String, failed: usize },
    /// An error occurred during reload
    Error(String),
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

/// Package names may not contain the package separator
fn package_name(path: &Path) -> Option<String> {
    let name = if path.is_dir() {
        path.file_name()?
    } else {
        path.file_stem()?
    };
    let name = name.to_str()?;
    (!name.is_empty() && !name.contains(crate::id::PACKAGE_SEPARATOR)).then(|| name.to_string())
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io_err = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        paths.push(entry.map_err(io_err)?.path());
    }
    paths.sort();
    Ok(paths)
}

/// Recursively collect TOML files (non-async to avoid boxing)
fn collect_toml_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), LoadError> {
    for path in read_dir_sorted(dir)? {
        if path.is_dir() {
            collect_toml_files(&path, paths)?;
        } else if is_toml(&path) {
            paths.push(path);
        }
    }
    Ok(())
}

fn read_package_file(path: &Path) -> Result<RawPackage, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| LoadError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

//! Dependency volume management.
//!
//! Per-project named volumes are keyed by the hash of the lockfiles that
//! feed them, so an install only reruns when its inputs change. The on-disk
//! registry is the source of truth for volume existence; drift against the
//! runtime is repaired lazily, never by eager scanning.

use std::{collections::HashMap, path::PathBuf};

use color_eyre::{Result, eyre::Context};
use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::Display;
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace, warn};

mod intercept;

pub use intercept::intercept_node_command;

use crate::{detect::ProjectType, fs, lockfile::LockfileHasher, runtime::Runtime};

/// Every volume name carries this prefix to avoid collisions with other
/// tools sharing the runtime's volume namespace.
pub const VOLUME_PREFIX: &str = "mitl-";

/// The single process-global pnpm store volume.
pub const PNPM_STORE_VOLUME: &str = "mitl-pnpm-store";

/// Where the pnpm store is mounted inside capsules.
pub const PNPM_STORE_CONTAINER_PATH: &str = "/pnpm-store";

/// Global composer download cache, shared across PHP projects.
pub const COMPOSER_CACHE_VOLUME: &str = "mitl-composer-cache";

/// Hex characters of the project and lockfile hashes used in volume names.
const NAME_HASH_LEN: usize = 8;

/// The closed set of volume types.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum VolumeType {
    Vendor,
    PnpmStore,
    PnpmModules,
    Venv,
    GoBuild,
    Gems,
}

impl VolumeType {
    /// The lockfiles whose contents key a volume of this type.
    pub fn lockfile_inputs(&self) -> &'static [&'static str] {
        match self {
            Self::Vendor => &["composer.lock"],
            Self::PnpmStore => &[],
            Self::PnpmModules => &["pnpm-lock.yaml", "package.json"],
            Self::Venv => &["requirements.txt", "Pipfile.lock", "poetry.lock"],
            Self::GoBuild => &["go.sum", "go.mod"],
            Self::Gems => &["Gemfile.lock"],
        }
    }

    /// Where a volume of this type is bound inside the capsule.
    pub fn container_path(&self) -> &'static str {
        match self {
            Self::Vendor => "/app/vendor",
            Self::PnpmStore => PNPM_STORE_CONTAINER_PATH,
            Self::PnpmModules => "/app/node_modules",
            Self::Venv => "/app/.venv",
            Self::GoBuild => "/root/.cache/go-build",
            Self::Gems => "/usr/local/bundle",
        }
    }

    /// Whether volumes of this type are process-global rather than
    /// project-scoped.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::PnpmStore)
    }
}

/// Registry entry for one named volume.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct VolumeMetadata {
    pub name: String,
    pub volume_type: VolumeType,
    /// Owning project root; empty for global volumes.
    pub project_path: String,
    pub lockfile_hash: String,
    pub created_at: Timestamp,
    pub last_used: Timestamp,
    pub size_bytes: u64,
    pub access_count: u64,
    /// Runtime the volume was created in.
    pub runtime: String,
}

/// Registry-backed manager of dependency volumes for one project.
#[derive(Debug)]
pub struct VolumeManager {
    runtime: Runtime,
    project_root: PathBuf,
    registry_path: PathBuf,
    registry: RwLock<HashMap<String, VolumeMetadata>>,
}

impl VolumeManager {
    /// Open the manager against the default registry location.
    pub async fn open(runtime: Runtime, project_root: impl Into<PathBuf>) -> Result<Self> {
        let registry_path = fs::volumes_registry_path()?;
        Self::open_at(runtime, project_root, registry_path).await
    }

    /// Open the manager against an explicit registry file.
    #[instrument(skip(runtime, project_root))]
    pub async fn open_at(
        runtime: Runtime,
        project_root: impl Into<PathBuf>,
        registry_path: PathBuf,
    ) -> Result<Self> {
        let registry = match fs::read_buffered(&registry_path).await? {
            Some(content) => serde_json::from_slice(&content)
                .with_context(|| format!("parse volumes registry: {registry_path:?}"))?,
            None => HashMap::new(),
        };

        let manager = Self {
            runtime,
            project_root: project_root.into(),
            registry_path,
            registry: RwLock::new(registry),
        };
        manager.ensure_global_pnpm_store().await?;
        Ok(manager)
    }

    /// Make sure the global pnpm store exists in the registry, creating the
    /// runtime volume on first use.
    async fn ensure_global_pnpm_store(&self) -> Result<()> {
        let mut registry = self.registry.write().await;
        if registry.contains_key(PNPM_STORE_VOLUME) {
            return Ok(());
        }
        if let Err(err) = self.runtime.volume_create(PNPM_STORE_VOLUME).await {
            // The name is still usable as a filesystem path fallback.
            warn!(error = %err, "could not create global pnpm store volume");
        }
        let now = Timestamp::now();
        registry.insert(
            PNPM_STORE_VOLUME.to_string(),
            VolumeMetadata {
                name: PNPM_STORE_VOLUME.to_string(),
                volume_type: VolumeType::PnpmStore,
                project_path: String::new(),
                lockfile_hash: "global".to_string(),
                created_at: now,
                last_used: now,
                size_bytes: 0,
                access_count: 0,
                runtime: self.runtime.name().to_string(),
            },
        );
        self.persist(&registry).await
    }

    /// First 8 hex characters of the project root path hash.
    fn project_hash(&self) -> String {
        let digest = Sha256::digest(self.project_root.to_string_lossy().as_bytes());
        hex::encode(digest)[..NAME_HASH_LEN].to_string()
    }

    /// The lockfile-hash suffix for a volume type: the hash of the inputs
    /// that exist, or a project-path-derived suffix when none do.
    async fn lockfile_suffix(&self, volume_type: VolumeType) -> Result<String> {
        let hasher = LockfileHasher::new(&self.project_root);
        let hash = hasher.hash_raw_set(volume_type.lockfile_inputs()).await?;
        Ok(match hash {
            Some(hash) => hash[..NAME_HASH_LEN].to_string(),
            None => self.project_hash(),
        })
    }

    /// Deterministic volume name: `mitl-<project8>-<type>-<lockfile8>`.
    fn volume_name(&self, volume_type: VolumeType, lockfile_suffix: &str) -> String {
        format!(
            "{VOLUME_PREFIX}{}-{volume_type}-{lockfile_suffix}",
            self.project_hash()
        )
    }

    /// Get or create the volume for a type, invalidating any stale volume
    /// whose lockfile hash no longer matches.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, volume_type: VolumeType) -> Result<String> {
        if volume_type.is_global() {
            let mut registry = self.registry.write().await;
            if let Some(entry) = registry.get_mut(PNPM_STORE_VOLUME) {
                entry.last_used = Timestamp::now();
                entry.access_count += 1;
                self.persist(&registry).await?;
            }
            return Ok(PNPM_STORE_VOLUME.to_string());
        }

        let suffix = self.lockfile_suffix(volume_type).await?;
        let name = self.volume_name(volume_type, &suffix);
        let project_path = self.project_root.to_string_lossy().to_string();

        let mut registry = self.registry.write().await;
        if let Some(entry) = registry.get_mut(&name) {
            entry.last_used = Timestamp::now();
            entry.access_count += 1;
            trace!(%name, "volume registry hit");
            self.persist(&registry).await?;
            return Ok(name);
        }

        // A different name for the same (project, type) means the lockfiles
        // changed; the old volume is stale.
        let stale: Vec<String> = registry
            .values()
            .filter(|entry| {
                entry.project_path == project_path && entry.volume_type == volume_type
            })
            .map(|entry| entry.name.clone())
            .collect();
        for stale_name in stale {
            debug!(%stale_name, "invalidating stale volume");
            if let Err(err) = self.runtime.volume_remove(&stale_name, true).await {
                warn!(%stale_name, error = %err, "could not remove stale volume");
            }
            registry.remove(&stale_name);
        }

        if let Err(err) = self.runtime.volume_create(&name).await {
            // Callers may still use the name as a path fallback.
            warn!(%name, error = %err, "could not create volume");
        }
        let now = Timestamp::now();
        registry.insert(
            name.clone(),
            VolumeMetadata {
                name: name.clone(),
                volume_type,
                project_path,
                lockfile_hash: suffix,
                created_at: now,
                last_used: now,
                size_bytes: 0,
                access_count: 1,
                runtime: self.runtime.name().to_string(),
            },
        );
        self.persist(&registry).await?;
        Ok(name)
    }

    /// Runtime-command flags binding the project and its dependency volumes
    /// into the capsule.
    #[instrument(skip(self))]
    pub async fn mounts_for(&self, project_type: ProjectType) -> Result<Vec<String>> {
        let mut flags = vec![
            "-v".to_string(),
            format!("{}:/app", self.project_root.to_string_lossy()),
        ];
        let bind = |name: String, path: &str, flags: &mut Vec<String>| {
            flags.push("-v".to_string());
            flags.push(format!("{name}:{path}"));
        };

        if project_type.is_php() {
            let vendor = self.get_or_create(VolumeType::Vendor).await?;
            bind(vendor, VolumeType::Vendor.container_path(), &mut flags);
            bind(
                COMPOSER_CACHE_VOLUME.to_string(),
                "/root/.composer/cache",
                &mut flags,
            );
        } else if project_type.is_node() {
            let store = self.get_or_create(VolumeType::PnpmStore).await?;
            bind(store, PNPM_STORE_CONTAINER_PATH, &mut flags);
            let modules = self.get_or_create(VolumeType::PnpmModules).await?;
            bind(modules, VolumeType::PnpmModules.container_path(), &mut flags);
            // Force pnpm onto the shared store with hard-linked imports.
            flags.push("-e".to_string());
            flags.push(format!("npm_config_store_dir={PNPM_STORE_CONTAINER_PATH}"));
            flags.push("-e".to_string());
            flags.push("npm_config_package_import_method=hardlink".to_string());
        } else if project_type.is_python() {
            let venv = self.get_or_create(VolumeType::Venv).await?;
            bind(venv, VolumeType::Venv.container_path(), &mut flags);
        } else if project_type.is_go() {
            let go_build = self.get_or_create(VolumeType::GoBuild).await?;
            bind(go_build, VolumeType::GoBuild.container_path(), &mut flags);
        } else if project_type.is_ruby() {
            let gems = self.get_or_create(VolumeType::Gems).await?;
            bind(gems, VolumeType::Gems.container_path(), &mut flags);
        }

        Ok(flags)
    }

    /// Delete volumes unused for more than `days`, sparing the global pnpm
    /// store. Returns the affected names; with `dry_run` nothing mutates.
    #[instrument(skip(self))]
    pub async fn clean_old(&self, days: u64, dry_run: bool) -> Result<Vec<String>> {
        let cutoff = Timestamp::now() - SignedDuration::from_secs(days as i64 * 86_400);
        let mut registry = self.registry.write().await;
        let old: Vec<String> = registry
            .values()
            .filter(|entry| entry.name != PNPM_STORE_VOLUME && entry.last_used < cutoff)
            .map(|entry| entry.name.clone())
            .collect();

        if dry_run {
            return Ok(old);
        }
        for name in &old {
            if let Err(err) = self.runtime.volume_remove(name, true).await {
                warn!(%name, error = %err, "could not remove volume");
            }
            registry.remove(name);
        }
        self.persist(&registry).await?;
        Ok(old)
    }

    /// Snapshot of the registry entries, sorted by name.
    pub async fn entries(&self) -> Vec<VolumeMetadata> {
        let registry = self.registry.read().await;
        let mut entries: Vec<_> = registry.values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Re-serialize the registry. Called with the write lock held so the
    /// in-memory update and the write are a single critical section.
    async fn persist(&self, registry: &HashMap<String, VolumeMetadata>) -> Result<()> {
        let content = serde_json::to_vec_pretty(registry).context("serialize volumes registry")?;
        fs::write(&self.registry_path, content).await
    }
}

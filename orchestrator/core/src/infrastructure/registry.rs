// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # File-backed Instance Registry
//!
//! Durable store of every known instance plus the single global config value.
//!
//! | File | Format |
//! |------|--------|
//! | `instances` | one row per instance: `id|recipeLocation|namePrefix[|proxyPort]` |
//! | `global.yaml` | `active_instance`, `proxy_mode_enabled` |
//!
//! Both files are meant to survive hand edits: rows that do not parse are
//! skipped with a warning (and dropped on the next rewrite), blank lines and
//! `#` comments are ignored. There is no locking; a single interactive user
//! is assumed and the last writer wins.

use crate::domain::instance::{GlobalConfig, GlobalField, Instance, InstanceId};
use crate::domain::settings::Paths;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const FIELD_SEPARATOR: char = '|';

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(
        "'{name_prefix}' conflicts with {} existing registration(s): {}",
        .conflicts.len(),
        describe(.conflicts)
    )]
    Conflict {
        name_prefix: String,
        conflicts: Vec<Instance>,
    },

    #[error("Registry I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {}: {message}", .path.display())]
    Serialization { path: PathBuf, message: String },

    #[error("Invalid registry value: {0}")]
    InvalidValue(String),
}

fn describe(instances: &[Instance]) -> String {
    instances
        .iter()
        .map(|i| format!("{} ({})", i.name_prefix, i.recipe_location.display()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// How `register` treats entries that share the recipe location or prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Fail with [`RegistryError::Conflict`]
    Abort,
    /// Remove every conflicting entry; the incoming registration survives
    Deduplicate,
}

/// Input to [`InstanceRegistry::register`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub recipe_location: PathBuf,
    pub id: Option<InstanceId>,
    pub name_prefix: String,
}

pub struct InstanceRegistry {
    registry_file: PathBuf,
    global_file: PathBuf,
}

impl InstanceRegistry {
    /// Open the registry, creating the base directory on first use
    pub fn open(paths: &Paths) -> Result<Self, RegistryError> {
        std::fs::create_dir_all(paths.base()).map_err(|source| RegistryError::Io {
            path: paths.base().to_path_buf(),
            source,
        })?;
        Ok(Self {
            registry_file: paths.registry_file(),
            global_file: paths.global_file(),
        })
    }

    // ========================================================================
    // Instances
    // ========================================================================

    pub fn list(&self) -> Result<Vec<Instance>, RegistryError> {
        let content = match std::fs::read_to_string(&self.registry_file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(RegistryError::Io {
                    path: self.registry_file.clone(),
                    source,
                })
            }
        };

        Ok(content
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            })
            .filter_map(|(index, line)| match parse_row(line) {
                Ok(instance) => Some(instance),
                Err(reason) => {
                    warn!(
                        "Skipping malformed registry row {} in {:?}: {}",
                        index + 1,
                        self.registry_file,
                        reason
                    );
                    None
                }
            })
            .collect())
    }

    pub fn get_by_prefix(&self, name_prefix: &str) -> Result<Option<Instance>, RegistryError> {
        Ok(self.list()?.into_iter().find(|i| i.name_prefix == name_prefix))
    }

    pub fn get_by_id(&self, id: &InstanceId) -> Result<Option<Instance>, RegistryError> {
        Ok(self.list()?.into_iter().find(|i| &i.id == id))
    }

    pub fn get_active(&self) -> Result<Option<Instance>, RegistryError> {
        match self.get_global()?.active_instance {
            Some(id) => self.get_by_id(&id),
            None => Ok(None),
        }
    }

    /// Insert or update an instance and return its id.
    ///
    /// Upserts by `id` when given, otherwise by name prefix. When several
    /// rows share the prefix, the last (most recently registered) one donates
    /// its id. Conflicting entries are never overwritten silently; with
    /// [`ConflictResolution::Deduplicate`] they are removed and the incoming
    /// registration wins.
    pub fn register(
        &self,
        registration: Registration,
        resolution: ConflictResolution,
    ) -> Result<InstanceId, RegistryError> {
        validate_field("recipe location", &registration.recipe_location.to_string_lossy())?;
        validate_field("name prefix", &registration.name_prefix)?;
        if let Some(id) = &registration.id {
            validate_field("id", id.as_str())?;
        }

        let mut entries = self.list()?;
        let existing_id = resolve_id(&entries, &registration);
        let conflicts = conflicts_of(&entries, &registration, existing_id.as_ref());

        let mut global = self.get_global()?;
        let mut clear_active = false;
        if !conflicts.is_empty() {
            match resolution {
                ConflictResolution::Abort => {
                    return Err(RegistryError::Conflict {
                        name_prefix: registration.name_prefix,
                        conflicts,
                    })
                }
                ConflictResolution::Deduplicate => {
                    warn!(
                        "Removing {} conflicting registration(s) for '{}': {}",
                        conflicts.len(),
                        registration.name_prefix,
                        describe(&conflicts)
                    );
                    clear_active = conflicts
                        .iter()
                        .any(|c| global.active_instance.as_ref() == Some(&c.id));
                    entries.retain(|e| !conflicts.contains(e));
                }
            }
        }

        let id = existing_id.unwrap_or_else(InstanceId::generate);
        let previous_port = entries.iter().find(|e| e.id == id).and_then(|e| e.proxy_port);
        let instance = Instance {
            id: id.clone(),
            recipe_location: registration.recipe_location,
            name_prefix: registration.name_prefix,
            proxy_port: previous_port,
        };

        match entries.iter().position(|e| e.id == id) {
            Some(pos) => {
                entries[pos] = instance;
                let mut seen = false;
                entries.retain(|e| {
                    if e.id != id {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => entries.push(instance),
        }

        self.write_rows(&entries)?;
        if clear_active {
            global.active_instance = None;
            self.write_global(&global)?;
        }
        info!("Registered instance {}", id);
        Ok(id)
    }

    /// Remove the entry for `name_prefix`. Returns `false` and leaves the
    /// registry untouched when nothing matched. Clears the active instance
    /// when it was the one removed.
    pub fn deregister(&self, name_prefix: &str) -> Result<bool, RegistryError> {
        let entries = self.list()?;
        let (removed, kept): (Vec<Instance>, Vec<Instance>) =
            entries.into_iter().partition(|e| e.name_prefix == name_prefix);
        if removed.is_empty() {
            return Ok(false);
        }

        self.write_rows(&kept)?;

        let mut global = self.get_global()?;
        if removed
            .iter()
            .any(|r| global.active_instance.as_ref() == Some(&r.id))
        {
            global.active_instance = None;
            self.write_global(&global)?;
        }
        info!("Deregistered instance '{}'", name_prefix);
        Ok(true)
    }

    /// Returns `false` when no entry has `name_prefix`
    pub fn set_proxy_port(&self, name_prefix: &str, port: Option<u16>) -> Result<bool, RegistryError> {
        let mut entries = self.list()?;
        let mut found = false;
        for entry in entries.iter_mut().filter(|e| e.name_prefix == name_prefix) {
            entry.proxy_port = port;
            found = true;
        }
        if found {
            self.write_rows(&entries)?;
        }
        Ok(found)
    }

    // ========================================================================
    // Global config
    // ========================================================================

    pub fn get_global(&self) -> Result<GlobalConfig, RegistryError> {
        let content = match std::fs::read_to_string(&self.global_file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(GlobalConfig::default()),
            Err(source) => {
                return Err(RegistryError::Io {
                    path: self.global_file.clone(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(GlobalConfig::default());
        }
        match serde_yaml::from_str(&content) {
            Ok(global) => Ok(global),
            Err(e) => {
                warn!("Ignoring unreadable global config {:?}: {}", self.global_file, e);
                Ok(GlobalConfig::default())
            }
        }
    }

    pub fn set_global_field(&self, field: GlobalField) -> Result<(), RegistryError> {
        let mut global = self.get_global()?;
        global.apply(field);
        self.write_global(&global)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    fn write_rows(&self, entries: &[Instance]) -> Result<(), RegistryError> {
        let content: String = entries.iter().map(|e| format!("{}\n", format_row(e))).collect();
        write_file(&self.registry_file, &content)
    }

    fn write_global(&self, global: &GlobalConfig) -> Result<(), RegistryError> {
        let yaml = serde_yaml::to_string(global).map_err(|e| RegistryError::Serialization {
            path: self.global_file.clone(),
            message: e.to_string(),
        })?;
        write_file(&self.global_file, &yaml)
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), RegistryError> {
    std::fs::write(path, content).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn resolve_id(entries: &[Instance], registration: &Registration) -> Option<InstanceId> {
    match &registration.id {
        Some(id) => Some(id.clone()),
        None => entries
            .iter()
            .rev()
            .find(|e| e.name_prefix == registration.name_prefix)
            .map(|e| e.id.clone()),
    }
}

fn conflicts_of(entries: &[Instance], registration: &Registration, id: Option<&InstanceId>) -> Vec<Instance> {
    entries
        .iter()
        .filter(|e| Some(&e.id) != id)
        .filter(|e| {
            e.recipe_location == registration.recipe_location || e.name_prefix == registration.name_prefix
        })
        .cloned()
        .collect()
}

fn validate_field(name: &str, value: &str) -> Result<(), RegistryError> {
    if value.is_empty() {
        return Err(RegistryError::InvalidValue(format!("{} cannot be empty", name)));
    }
    if value.contains(FIELD_SEPARATOR) || value.contains('\n') {
        return Err(RegistryError::InvalidValue(format!(
            "{} '{}' may not contain '{}' or a newline",
            name, value, FIELD_SEPARATOR
        )));
    }
    Ok(())
}

fn parse_row(line: &str) -> Result<Instance, String> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
    if fields.len() != 3 && fields.len() != 4 {
        return Err(format!("expected 3 or 4 fields, found {}", fields.len()));
    }
    if fields[..3].iter().any(|f| f.is_empty()) {
        return Err("id, recipe location and name prefix are required".to_string());
    }
    let proxy_port = match fields.get(3) {
        None | Some(&"") => None,
        Some(port) => Some(
            port.parse::<u16>()
                .map_err(|_| format!("invalid proxy port '{}'", port))?,
        ),
    };
    Ok(Instance {
        id: InstanceId::new(fields[0]),
        recipe_location: PathBuf::from(fields[1]),
        name_prefix: fields[2].to_string(),
        proxy_port,
    })
}

fn format_row(instance: &Instance) -> String {
    let mut row = format!(
        "{}{sep}{}{sep}{}",
        instance.id,
        instance.recipe_location.display(),
        instance.name_prefix,
        sep = FIELD_SEPARATOR
    );
    if let Some(port) = instance.proxy_port {
        row.push(FIELD_SEPARATOR);
        row.push_str(&port.to_string());
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (tempfile::TempDir, InstanceRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = InstanceRegistry::open(&Paths::new(dir.path().join("home"))).unwrap();
        (dir, registry)
    }

    fn registration(recipe: &str, prefix: &str, id: Option<&str>) -> Registration {
        Registration {
            recipe_location: PathBuf::from(recipe),
            id: id.map(InstanceId::new),
            name_prefix: prefix.to_string(),
        }
    }

    #[test]
    fn test_open_creates_base_directory() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested").join("home");
        InstanceRegistry::open(&Paths::new(&base)).unwrap();
        assert!(base.is_dir());
    }

    #[test]
    fn test_rows_round_trip() {
        let (_dir, registry) = registry();
        let entries = vec![
            Instance::new(InstanceId::new("a1"), "/srv/demo/devstack.yml", "demo").with_proxy_port(8123),
            Instance::new(InstanceId::new("b2"), "/srv/other/devstack.yml", "other"),
        ];
        registry.write_rows(&entries).unwrap();
        assert_eq!(registry.list().unwrap(), entries);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let (_dir, registry) = registry();
        std::fs::write(
            &registry.registry_file,
            "a1|/srv/demo/devstack.yml|demo\n\
             # hand-written note\n\
             broken-row\n\
             b2|/srv/x|x|notaport\n\
             \n\
             c3|/srv/other/devstack.yml|other|8100\n",
        )
        .unwrap();
        let prefixes: Vec<String> = registry.list().unwrap().into_iter().map(|i| i.name_prefix).collect();
        assert_eq!(prefixes, vec!["demo", "other"]);
    }

    #[test]
    fn test_register_generates_id() {
        let (_dir, registry) = registry();
        let id = registry
            .register(registration("/srv/demo/devstack.yml", "demo", None), ConflictResolution::Abort)
            .unwrap();
        let instance = registry.get_by_prefix("demo").unwrap().unwrap();
        assert_eq!(instance.id, id);
        assert!(!id.as_str().is_empty());
    }

    #[test]
    fn test_register_is_idempotent_for_same_id() {
        let (_dir, registry) = registry();
        let reg = registration("/srv/demo/devstack.yml", "demo", Some("a1"));
        registry.register(reg.clone(), ConflictResolution::Abort).unwrap();
        registry.register(reg, ConflictResolution::Abort).unwrap();
        let entries = registry.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, InstanceId::new("a1"));
    }

    #[test]
    fn test_register_without_id_upserts_by_prefix() {
        let (_dir, registry) = registry();
        let first = registry
            .register(registration("/srv/demo/devstack.yml", "demo", None), ConflictResolution::Abort)
            .unwrap();
        registry.set_proxy_port("demo", Some(8100)).unwrap();
        let second = registry
            .register(registration("/srv/moved/devstack.yml", "demo", None), ConflictResolution::Abort)
            .unwrap();
        assert_eq!(first, second);
        let entries = registry.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].recipe_location, PathBuf::from("/srv/moved/devstack.yml"));
        assert_eq!(entries[0].proxy_port, Some(8100));
    }

    #[test]
    fn test_register_conflicting_prefix_is_rejected() {
        let (_dir, registry) = registry();
        registry
            .register(registration("/srv/demo/devstack.yml", "demo", Some("a1")), ConflictResolution::Abort)
            .unwrap();
        let err = registry
            .register(registration("/srv/copy/devstack.yml", "demo", Some("b2")), ConflictResolution::Abort)
            .unwrap_err();
        match err {
            RegistryError::Conflict { conflicts, .. } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].id, InstanceId::new("a1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn test_register_conflicting_recipe_location_is_rejected() {
        let (_dir, registry) = registry();
        registry
            .register(registration("/srv/demo/devstack.yml", "demo", None), ConflictResolution::Abort)
            .unwrap();
        let err = registry
            .register(registration("/srv/demo/devstack.yml", "renamed", None), ConflictResolution::Abort)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));
    }

    #[test]
    fn test_deduplicate_removes_every_conflict() {
        let (_dir, registry) = registry();
        std::fs::write(
            &registry.registry_file,
            "a1|/srv/demo/devstack.yml|demo\nb2|/srv/new/devstack.yml|legacy\nc3|/srv/keep/devstack.yml|keep\n",
        )
        .unwrap();
        registry
            .set_global_field(GlobalField::ActiveInstance(Some(InstanceId::new("b2"))))
            .unwrap();

        let id = registry
            .register(registration("/srv/new/devstack.yml", "demo", Some("z9")), ConflictResolution::Deduplicate)
            .unwrap();

        let entries = registry.list().unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c3", "z9"]);
        assert_eq!(id, InstanceId::new("z9"));
        assert_eq!(registry.get_global().unwrap().active_instance, None);
    }

    #[test]
    fn test_register_rejects_separator_in_fields() {
        let (_dir, registry) = registry();
        let err = registry
            .register(registration("/srv/a|b/devstack.yml", "demo", None), ConflictResolution::Abort)
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidValue(_)));
    }

    #[test]
    fn test_deregister_missing_prefix_leaves_file_untouched() {
        let (_dir, registry) = registry();
        let content = "a1|/srv/demo/devstack.yml|demo\n# note\n";
        std::fs::write(&registry.registry_file, content).unwrap();
        assert!(!registry.deregister("ghost").unwrap());
        assert_eq!(std::fs::read_to_string(&registry.registry_file).unwrap(), content);
    }

    #[test]
    fn test_deregister_active_clears_active() {
        let (_dir, registry) = registry();
        let id = registry
            .register(registration("/srv/demo/devstack.yml", "demo", None), ConflictResolution::Abort)
            .unwrap();
        registry.set_global_field(GlobalField::ActiveInstance(Some(id))).unwrap();
        registry.set_global_field(GlobalField::ProxyModeEnabled(true)).unwrap();

        assert!(registry.deregister("demo").unwrap());
        let global = registry.get_global().unwrap();
        assert_eq!(global.active_instance, None);
        assert!(global.proxy_mode_enabled);
    }

    #[test]
    fn test_deregister_other_keeps_active() {
        let (_dir, registry) = registry();
        let active = registry
            .register(registration("/srv/demo/devstack.yml", "demo", None), ConflictResolution::Abort)
            .unwrap();
        registry
            .register(registration("/srv/other/devstack.yml", "other", None), ConflictResolution::Abort)
            .unwrap();
        registry
            .set_global_field(GlobalField::ActiveInstance(Some(active.clone())))
            .unwrap();

        assert!(registry.deregister("other").unwrap());
        assert_eq!(registry.get_global().unwrap().active_instance, Some(active.clone()));
        assert_eq!(registry.get_active().unwrap().unwrap().id, active);
    }

    #[test]
    fn test_unreadable_global_falls_back_to_default() {
        let (_dir, registry) = registry();
        std::fs::write(&registry.global_file, "proxy_mode_enabled: [oops\n").unwrap();
        assert_eq!(registry.get_global().unwrap(), GlobalConfig::default());
    }

    #[test]
    fn test_set_proxy_port_unknown_prefix() {
        let (_dir, registry) = registry();
        assert!(!registry.set_proxy_port("ghost", Some(8100)).unwrap());
        assert!(!registry.registry_file.exists());
    }
}

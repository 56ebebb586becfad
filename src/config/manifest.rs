//! Page manifests: JSON descriptions of a page's groups and toggles.
//!
//! ```json
//! {
//!   "page": "system",
//!   "groups": [{
//!     "name": "services",
//!     "title": "Services",
//!     "description": "Background daemons",
//!     "toggles": [
//!       { "title": "Docker", "subtitle": "Container engine", "script": "docker" },
//!       { "title": "Portainer", "subtitle": "Web UI", "script": "portainer", "parent": "docker" },
//!       { "title": "GPU", "subtitle": "", "script": "gpuStatus", "kind": "indicator" }
//!     ]
//!   }]
//! }
//! ```
//!
//! A group's scripts live in `base_directory`, or `<scripts_base_dir>/<name>`
//! when it is omitted. `parent` names a script listed earlier on the page.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::loader;
use crate::error::{ConfigError, RegistryError};
use crate::models::{ScriptGroup, ToggleId, ToggleKind};
use crate::registry::{ToggleRegistry, ToggleSpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageManifest {
    pub page: String,
    #[serde(default)]
    pub groups: Vec<GroupManifest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupManifest {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub base_directory: Option<PathBuf>,
    #[serde(default)]
    pub toggles: Vec<ToggleManifest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleManifest {
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    pub script: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
    /// Mutation timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub kind: ToggleKind,
}

impl PageManifest {
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let manifest: PageManifest = serde_json::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let manifest: PageManifest = loader::load_json(path)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for group in &self.groups {
            if group.name.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "page {}: group without a name",
                    self.page
                )));
            }
            for toggle in &group.toggles {
                if toggle.script.trim().is_empty() {
                    return Err(ConfigError::ValidationFailed(format!(
                        "page {}: toggle '{}' has no script",
                        self.page, toggle.title
                    )));
                }
                if toggle.timeout == Some(0) {
                    return Err(ConfigError::ValidationFailed(format!(
                        "page {}: toggle '{}' has a zero timeout",
                        self.page, toggle.title
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn toggle_count(&self) -> usize {
        self.groups.iter().map(|g| g.toggles.len()).sum()
    }
}

/// Register every group and toggle of `manifest`, in manifest order.
pub fn register_manifest(
    registry: &mut ToggleRegistry,
    manifest: &PageManifest,
    scripts_base_dir: &Path,
) -> Result<Vec<ToggleId>, ConfigError> {
    manifest.validate()?;

    let mut by_script: HashMap<&str, ToggleId> = HashMap::new();
    let mut ids = Vec::with_capacity(manifest.toggle_count());

    for group in &manifest.groups {
        let base_directory = group
            .base_directory
            .clone()
            .unwrap_or_else(|| scripts_base_dir.join(&group.name));
        let group_id = registry.add_group(
            ScriptGroup::new(group.name.clone(), base_directory),
            &group.title,
            &group.description,
        );

        for toggle in &group.toggles {
            let mut spec = ToggleSpec::switch(&toggle.script, &toggle.title, &toggle.subtitle);
            spec.kind = toggle.kind;
            spec.timeout = toggle.timeout.map(Duration::from_secs);
            spec.info_text = toggle.info.clone();
            spec.icon = toggle.icon.clone();
            if let Some(parent) = &toggle.parent {
                let parent_id = by_script
                    .get(parent.as_str())
                    .copied()
                    .ok_or_else(|| RegistryError::UnknownParent(parent.clone()))?;
                spec.parent = Some(parent_id);
            }

            let id = registry.register(group_id, spec)?;
            by_script.insert(toggle.script.as_str(), id);
            ids.push(id);
        }
    }

    log::info!(
        "[Config] Page '{}': registered {} toggles in {} groups",
        manifest.page,
        ids.len(),
        manifest.groups.len()
    );
    Ok(ids)
}

//! Toggle registry: arena of toggles keyed by `ToggleId`.
//!
//! The registry is pure bookkeeping. It knows where each toggle's script
//! lives, its timeout and its parent, and keeps the parent -> children
//! adjacency in registration order. Display fields are only changed through
//! the `pub(crate)` mutators, which the synchronizer and the change
//! coordinator call while holding the write lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::error::RegistryError;
use crate::models::{
    Availability, DisplayState, ScriptGroup, Toggle, ToggleId, ToggleKind, ToggleSnapshot,
    DEFAULT_TOGGLE_TIMEOUT,
};
use crate::script::ProbeOutcome;

/// Registry shared between the interactive side and background workers.
///
/// A `std` lock: it is never held across an `.await`, and the UI side can
/// take a consistent read without a runtime.
pub type SharedRegistry = Arc<RwLock<ToggleRegistry>>;

/// Read access that survives a panicked writer.
pub fn read_registry(registry: &SharedRegistry) -> RwLockReadGuard<'_, ToggleRegistry> {
    registry.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn write_registry(registry: &SharedRegistry) -> RwLockWriteGuard<'_, ToggleRegistry> {
    registry.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

/// A titled block of toggles sharing one script directory.
#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub id: GroupId,
    pub group: ScriptGroup,
    pub title: String,
    pub description: String,
    pub members: Vec<ToggleId>,
}

/// Everything needed to register one toggle inside a group.
#[derive(Debug, Clone, PartialEq)]
pub struct ToggleSpec {
    /// Script name without the `.sh` suffix.
    pub script: String,
    pub title: String,
    pub subtitle: String,
    pub kind: ToggleKind,
    pub timeout: Option<Duration>,
    pub parent: Option<ToggleId>,
    pub info_text: Option<String>,
    pub icon: Option<String>,
}

impl ToggleSpec {
    pub fn switch(script: &str, title: &str, subtitle: &str) -> Self {
        ToggleSpec {
            script: script.to_string(),
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            kind: ToggleKind::Switch,
            timeout: None,
            parent: None,
            info_text: None,
            icon: None,
        }
    }

    pub fn indicator(script: &str, title: &str, subtitle: &str) -> Self {
        ToggleSpec {
            kind: ToggleKind::Indicator,
            ..Self::switch(script, title, subtitle)
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_parent(mut self, parent: ToggleId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_info(mut self, info: &str) -> Self {
        self.info_text = Some(info.to_string());
        self
    }

    pub fn with_icon(mut self, icon: &str) -> Self {
        self.icon = Some(icon.to_string());
        self
    }
}

#[derive(Debug)]
pub struct ToggleRegistry {
    toggles: Vec<Toggle>,
    children: Vec<Vec<ToggleId>>,
    groups: Vec<GroupEntry>,
    by_script: HashMap<PathBuf, ToggleId>,
    default_timeout: Duration,
}

impl Default for ToggleRegistry {
    fn default() -> Self {
        Self::with_default_timeout(DEFAULT_TOGGLE_TIMEOUT)
    }
}

impl ToggleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout given to toggles registered without one.
    pub fn with_default_timeout(default_timeout: Duration) -> Self {
        ToggleRegistry {
            toggles: Vec::new(),
            children: Vec::new(),
            groups: Vec::new(),
            by_script: HashMap::new(),
            default_timeout,
        }
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    pub fn add_group(&mut self, group: ScriptGroup, title: &str, description: &str) -> GroupId {
        let id = GroupId(self.groups.len());
        self.groups.push(GroupEntry {
            id,
            group,
            title: title.to_string(),
            description: description.to_string(),
            members: Vec::new(),
        });
        id
    }

    pub fn group(&self, id: GroupId) -> Result<&GroupEntry, RegistryError> {
        self.groups.get(id.0).ok_or(RegistryError::UnknownGroup(id.0))
    }

    pub fn groups(&self) -> &[GroupEntry] {
        &self.groups
    }

    /// Register `spec` under `group`; the script path is derived from the
    /// group's base directory.
    pub fn register(&mut self, group: GroupId, spec: ToggleSpec) -> Result<ToggleId, RegistryError> {
        let entry = self.group(group)?;
        let script_path = entry.group.script_path(&spec.script);
        let group_name = entry.group.group_name.clone();

        let id = self.insert(script_path, group_name, spec)?;
        self.groups[group.0].members.push(id);
        Ok(id)
    }

    /// Register a bare script outside any group.
    pub fn register_script(
        &mut self,
        script_path: impl Into<PathBuf>,
        timeout: Option<Duration>,
        parent: Option<ToggleId>,
    ) -> Result<ToggleId, RegistryError> {
        let script_path = script_path.into();
        let title = crate::models::script_display_name(&script_path);
        let spec = ToggleSpec {
            script: title.clone(),
            title,
            subtitle: String::new(),
            kind: ToggleKind::Switch,
            timeout,
            parent,
            info_text: None,
            icon: None,
        };
        self.insert(script_path, String::new(), spec)
    }

    fn insert(
        &mut self,
        script_path: PathBuf,
        group_name: String,
        spec: ToggleSpec,
    ) -> Result<ToggleId, RegistryError> {
        if let Some(parent) = spec.parent {
            if parent.0 >= self.toggles.len() {
                return Err(RegistryError::UnknownParent(parent.to_string()));
            }
        }
        if self.by_script.contains_key(&script_path) {
            return Err(RegistryError::DuplicateScript(script_path));
        }

        let id = ToggleId(self.toggles.len());
        let searchable_text = format!("{} {}", spec.title, spec.subtitle).to_lowercase();
        self.toggles.push(Toggle {
            id,
            kind: spec.kind,
            title: spec.title,
            subtitle: spec.subtitle,
            group_name,
            script_path: script_path.clone(),
            timeout: spec.timeout.unwrap_or(self.default_timeout),
            parent: spec.parent,
            info_text: spec.info_text,
            icon: spec.icon,
            display_state: DisplayState::Unknown,
            availability: Availability::Unavailable,
            message: None,
            visible: false,
            hint_visible: false,
            searchable_text,
        });
        self.children.push(Vec::new());
        if let Some(parent) = spec.parent {
            self.children[parent.0].push(id);
        }
        self.by_script.insert(script_path, id);

        log::debug!("[Registry] Registered {} as {}", self.toggles[id.0].script_name(), id);
        Ok(id)
    }

    pub fn get(&self, id: ToggleId) -> Result<&Toggle, RegistryError> {
        self.toggles.get(id.0).ok_or(RegistryError::UnknownHandle(id.0))
    }

    fn get_mut(&mut self, id: ToggleId) -> Result<&mut Toggle, RegistryError> {
        self.toggles.get_mut(id.0).ok_or(RegistryError::UnknownHandle(id.0))
    }

    /// Direct children in registration order.
    pub fn children_of(&self, parent: ToggleId) -> Result<&[ToggleId], RegistryError> {
        self.children
            .get(parent.0)
            .map(Vec::as_slice)
            .ok_or(RegistryError::UnknownHandle(parent.0))
    }

    pub fn find_by_script(&self, script_path: &Path) -> Option<ToggleId> {
        self.by_script.get(script_path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Toggle> {
        self.toggles.iter()
    }

    pub fn ids(&self) -> Vec<ToggleId> {
        self.toggles.iter().map(|t| t.id).collect()
    }

    pub fn len(&self) -> usize {
        self.toggles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toggles.is_empty()
    }

    pub fn snapshot(&self, id: ToggleId) -> Result<ToggleSnapshot, RegistryError> {
        self.get(id).map(Toggle::snapshot)
    }

    pub fn snapshots(&self) -> Vec<ToggleSnapshot> {
        self.toggles.iter().map(Toggle::snapshot).collect()
    }

    /// Store one probe result. Visibility is left for `recompute_visibility`
    /// so that a pass never reads a parent that has not been probed yet.
    pub(crate) fn apply_probe(&mut self, id: ToggleId, probe: &ProbeOutcome) -> Result<(), RegistryError> {
        let toggle = self.get_mut(id)?;
        toggle.availability = probe.availability;
        toggle.display_state = probe.display_state;
        toggle.message = match probe.availability {
            Availability::Available => None,
            Availability::LockedOn | Availability::Unavailable => Some(probe.message.clone()),
        };
        Ok(())
    }

    pub(crate) fn set_display_state(&mut self, id: ToggleId, state: DisplayState) -> Result<(), RegistryError> {
        let toggle = self.get_mut(id)?;
        toggle.display_state = state;
        toggle.hint_visible = hint_visible(toggle);
        Ok(())
    }

    /// Recompute `visible` and `hint_visible` for every toggle.
    ///
    /// Parents always have a smaller index than their children, so one
    /// forward pass sees every parent's final state.
    pub(crate) fn recompute_visibility(&mut self) {
        for index in 0..self.toggles.len() {
            let parent_shows_children = match self.toggles[index].parent {
                Some(parent) => {
                    let parent = &self.toggles[parent.0];
                    parent.visible && parent.display_state.is_on()
                }
                None => true,
            };
            let toggle = &mut self.toggles[index];
            toggle.visible = parent_shows_children && !toggle.is_hidden_no_support();
            toggle.hint_visible = hint_visible(toggle);
        }
    }

    /// Show or hide the direct children of `parent` right after a successful
    /// change, without waiting for the next sync. Returns the children.
    pub(crate) fn cascade_children(&mut self, parent: ToggleId, on: bool) -> Result<Vec<ToggleId>, RegistryError> {
        let children = self.children_of(parent)?.to_vec();
        for child in &children {
            let toggle = &mut self.toggles[child.0];
            toggle.visible = on && !toggle.is_hidden_no_support();
        }
        Ok(children)
    }
}

fn hint_visible(toggle: &Toggle) -> bool {
    toggle.info_text.is_some() && !toggle.is_hidden_no_support() && toggle.display_state.is_on()
}

//! Object Inventory Builder
//!
//! Queries a scene source once for the object types present in a scene and
//! their masses. The resulting inventory is immutable; callers share it by
//! reference (or `Arc`) across every task that uses the same scene.

use crate::error::PlanError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// One object instance reported by a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    #[serde(rename = "objectType")]
    pub object_type: String,
    pub mass: f64,
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("scene not found: {0}")]
    NotFound(String),

    #[error("scene read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("scene metadata malformed: {0}")]
    Malformed(String),
}

/// External collaborator that knows what a scene contains
pub trait SceneSource: Send + Sync {
    fn list_objects(&self, scene_id: &str) -> Result<Vec<SceneObject>, SceneError>;
}

/// Immutable `{object type -> mass}` mapping for one scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInventory {
    scene_id: String,
    objects: BTreeMap<String, f64>,
}

impl ObjectInventory {
    /// Collapse per-instance objects into a type mapping; first mass seen wins.
    pub fn from_objects(scene_id: impl Into<String>, objects: Vec<SceneObject>) -> Self {
        let mut map = BTreeMap::new();
        for obj in objects {
            map.entry(obj.object_type).or_insert(obj.mass);
        }
        Self {
            scene_id: scene_id.into(),
            objects: map,
        }
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    pub fn mass_of(&self, object_type: &str) -> Option<f64> {
        self.objects.get(object_type).copied()
    }

    pub fn contains(&self, object_type: &str) -> bool {
        self.objects.contains_key(object_type)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.objects.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// `[{'name': 'Apple', 'mass': 0.2}, ...]`, sorted by type name
    pub fn to_literal(&self) -> String {
        let items = self
            .objects
            .iter()
            .map(|(name, mass)| format!("{{'name': '{}', 'mass': {}}}", name, mass))
            .collect::<Vec<_>>()
            .join(", ");
        format!("[{}]", items)
    }
}

/// Query the scene once and build its inventory. No retry, no caching.
pub fn build_inventory(source: &dyn SceneSource, scene_id: &str) -> Result<ObjectInventory, PlanError> {
    let objects = source
        .list_objects(scene_id)
        .map_err(|e| PlanError::SceneUnavailable {
            scene_id: scene_id.to_string(),
            reason: e.to_string(),
        })?;
    debug!(scene_id, instances = objects.len(), "scene objects listed");
    Ok(ObjectInventory::from_objects(scene_id, objects))
}

/// Reads `<dir>/FloorPlan<N>.json` snapshots in simulator metadata shape:
/// `{"objects": [{"objectType": "Apple", "mass": 0.2}, ...]}`
pub struct SnapshotSceneSource {
    dir: PathBuf,
}

#[derive(Deserialize)]
struct SceneSnapshot {
    objects: Vec<SceneObject>,
}

impl SnapshotSceneSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn snapshot_path(&self, scene_id: &str) -> PathBuf {
        self.dir.join(format!("FloorPlan{}.json", scene_id))
    }
}

impl SceneSource for SnapshotSceneSource {
    fn list_objects(&self, scene_id: &str) -> Result<Vec<SceneObject>, SceneError> {
        let path = self.snapshot_path(scene_id);
        if !path.exists() {
            return Err(SceneError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(&path)?;
        let snapshot: SceneSnapshot =
            serde_json::from_str(&content).map_err(|e| SceneError::Malformed(e.to_string()))?;
        Ok(snapshot.objects)
    }
}

/// In-memory scenes, keyed by scene id
#[derive(Default)]
pub struct StaticSceneSource {
    scenes: HashMap<String, Vec<SceneObject>>,
}

impl StaticSceneSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scene(mut self, scene_id: &str, objects: &[(&str, f64)]) -> Self {
        let objects = objects
            .iter()
            .map(|(name, mass)| SceneObject {
                object_type: name.to_string(),
                mass: *mass,
            })
            .collect();
        self.scenes.insert(scene_id.to_string(), objects);
        self
    }
}

impl SceneSource for StaticSceneSource {
    fn list_objects(&self, scene_id: &str) -> Result<Vec<SceneObject>, SceneError> {
        self.scenes
            .get(scene_id)
            .cloned()
            .ok_or_else(|| SceneError::NotFound(scene_id.to_string()))
    }
}

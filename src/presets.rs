use std::fs;
use std::sync::{Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::{QueryPayload, SearchType, iso_timestamp};
use crate::error::HarvestError;
use crate::fs_util::write_bytes_atomic;

pub const PRESETS_FILE_NAME: &str = "presets.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: i64,
    #[serde(rename = "type")]
    pub search_type: SearchType,
    pub name: String,
    pub data: QueryPayload,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPreset {
    pub name: String,
    pub data: QueryPayload,
}

impl NewPreset {
    pub fn new(name: impl Into<String>, data: QueryPayload) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    fn validated_name(&self) -> Result<String, HarvestError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(HarvestError::InvalidInput("preset name is empty".to_string()));
        }
        if self.data.max_results() == 0 {
            return Err(HarvestError::InvalidInput(
                "maxResults must be at least 1".to_string(),
            ));
        }
        self.data.to_query()?;
        Ok(name.to_string())
    }
}

pub trait PresetStore: Send + Sync {
    fn list(&self) -> Result<Vec<Preset>, HarvestError>;
    fn get(&self, id: i64) -> Result<Preset, HarvestError>;
    fn find_by_name(&self, name: &str) -> Result<Option<Preset>, HarvestError>;
    fn create(&self, preset: NewPreset) -> Result<Preset, HarvestError>;
    fn update(&self, id: i64, preset: NewPreset) -> Result<Preset, HarvestError>;
    fn delete(&self, id: i64) -> Result<Preset, HarvestError>;
}

pub struct JsonPresetStore {
    path: Utf8PathBuf,
    lock: Mutex<()>,
}

impl JsonPresetStore {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn in_dir(dir: &Utf8Path) -> Self {
        Self::new(dir.join(PRESETS_FILE_NAME))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<Preset>, HarvestError> {
        let content = match fs::read_to_string(self.path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(HarvestError::Persistence(format!("read {}: {err}", self.path)));
            }
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content)
            .map_err(|err| HarvestError::Persistence(format!("parse {}: {err}", self.path)))
    }

    fn write_all(&self, presets: &[Preset]) -> Result<(), HarvestError> {
        let content = serde_json::to_vec_pretty(presets)
            .map_err(|err| HarvestError::Persistence(err.to_string()))?;
        write_bytes_atomic(&self.path, &content)
    }
}

impl PresetStore for JsonPresetStore {
    fn list(&self) -> Result<Vec<Preset>, HarvestError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_all()
    }

    fn get(&self, id: i64) -> Result<Preset, HarvestError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_all()?
            .into_iter()
            .find(|preset| preset.id == id)
            .ok_or_else(|| HarvestError::PresetNotFound(id.to_string()))
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Preset>, HarvestError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let name = name.trim();
        Ok(self.read_all()?.into_iter().find(|preset| preset.name == name))
    }

    fn create(&self, preset: NewPreset) -> Result<Preset, HarvestError> {
        let name = preset.validated_name()?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut presets = self.read_all()?;
        if presets.iter().any(|existing| existing.name == name) {
            return Err(HarvestError::DuplicatePresetName(name));
        }

        let mut id = chrono::Utc::now().timestamp_millis();
        while presets.iter().any(|existing| existing.id == id) {
            id += 1;
        }
        let created = Preset {
            id,
            search_type: preset.data.search_type(),
            name,
            data: preset.data,
            created_at: iso_timestamp(),
            updated_at: None,
        };
        presets.push(created.clone());
        self.write_all(&presets)?;
        tracing::info!(id, name = %created.name, "preset created");
        Ok(created)
    }

    fn update(&self, id: i64, preset: NewPreset) -> Result<Preset, HarvestError> {
        let name = preset.validated_name()?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut presets = self.read_all()?;
        if presets
            .iter()
            .any(|existing| existing.id != id && existing.name == name)
        {
            return Err(HarvestError::DuplicatePresetName(name));
        }
        let Some(target) = presets.iter_mut().find(|existing| existing.id == id) else {
            return Err(HarvestError::PresetNotFound(id.to_string()));
        };

        target.search_type = preset.data.search_type();
        target.name = name;
        target.data = preset.data;
        target.updated_at = Some(iso_timestamp());
        let updated = target.clone();
        self.write_all(&presets)?;
        tracing::info!(id, name = %updated.name, "preset updated");
        Ok(updated)
    }

    fn delete(&self, id: i64) -> Result<Preset, HarvestError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut presets = self.read_all()?;
        let index = presets
            .iter()
            .position(|existing| existing.id == id)
            .ok_or_else(|| HarvestError::PresetNotFound(id.to_string()))?;
        let removed = presets.remove(index);
        self.write_all(&presets)?;
        tracing::info!(id, name = %removed.name, "preset removed");
        Ok(removed)
    }
}

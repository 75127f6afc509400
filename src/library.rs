use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

pub type Features = BTreeMap<String, Value>;
pub type ModStateMap = BTreeMap<String, ProfileMod>;
pub type Profiles = BTreeMap<String, Arc<Profile>>;
pub type GameMods = BTreeMap<String, ModEntry>;

pub const LIBRARY_FILE: &str = "library.json";
pub const WAS_INSTALLED_ATTRIBUTE: &str = "wasInstalled";

const DEFAULT_PROFILE_ID: &str = "default";
const DEFAULT_GAME_ID: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize library: {0}")]
    Serialize(serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("unknown profile: {0}")]
    UnknownProfile(String),
    #[error("unknown mod '{mod_id}' for game '{game_id}'")]
    UnknownMod { game_id: String, mod_id: String },
}

/// Persistent host state: every profile, the mods of each game and the
/// active profile pointer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Library {
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: Profiles,
    #[serde(default)]
    pub mods: BTreeMap<String, Arc<GameMods>>,
}

impl Library {
    pub fn load_or_create(data_dir: &Path) -> Result<Self, LibraryError> {
        let path = data_dir.join(LIBRARY_FILE);
        if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| LibraryError::Read {
                path: path.clone(),
                source,
            })?;
            let mut library: Library =
                serde_json::from_str(&raw).map_err(|source| LibraryError::Parse {
                    path: path.clone(),
                    source,
                })?;
            library.normalize();
            return Ok(library);
        }

        let library = Library::seeded();
        library.save(data_dir)?;
        Ok(library)
    }

    pub fn save(&self, data_dir: &Path) -> Result<(), LibraryError> {
        let path = data_dir.join(LIBRARY_FILE);
        let raw = serde_json::to_string_pretty(self).map_err(LibraryError::Serialize)?;
        fs::write(&path, raw).map_err(|source| LibraryError::Write { path, source })
    }

    fn seeded() -> Self {
        let profile = Profile::new(DEFAULT_PROFILE_ID, DEFAULT_GAME_ID, "Default");
        let mut profiles = Profiles::new();
        profiles.insert(profile.id.clone(), Arc::new(profile));
        Self {
            active_profile: Some(DEFAULT_PROFILE_ID.to_string()),
            profiles,
            mods: BTreeMap::new(),
        }
    }

    // Map keys are authoritative; ids inside the records follow them.
    fn normalize(&mut self) {
        for (id, profile) in self.profiles.iter_mut() {
            if profile.id != *id {
                Arc::make_mut(profile).id = id.clone();
            }
        }
        for game_mods in self.mods.values_mut() {
            if game_mods.iter().any(|(id, entry)| entry.id != *id) {
                for (id, entry) in Arc::make_mut(game_mods).iter_mut() {
                    entry.id = id.clone();
                }
            }
        }
        if let Some(active) = &self.active_profile {
            if !self.profiles.contains_key(active) {
                log::warn!("Active profile '{active}' no longer exists");
                self.active_profile = self.profiles.keys().next().cloned();
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: String,
    pub game_id: String,
    pub name: String,
    #[serde(default)]
    pub features: Arc<Features>,
    #[serde(default)]
    pub mod_state: Arc<ModStateMap>,
}

impl Profile {
    pub fn new(id: &str, game_id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            game_id: game_id.to_string(),
            name: name.to_string(),
            features: Arc::new(Features::new()),
            mod_state: Arc::new(ModStateMap::new()),
        }
    }

    /// Missing entries count as disabled.
    pub fn is_mod_enabled(&self, mod_id: &str) -> bool {
        self.mod_state
            .get(mod_id)
            .map(|entry| entry.enabled)
            .unwrap_or(false)
    }

    pub fn feature_str(&self, feature: &str) -> Option<&str> {
        self.features.get(feature).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileMod {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_time: Option<i64>,
}

/// Install state as the host records it. States this crate does not know
/// about are kept verbatim and behave like an installed mod.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum InstallState {
    Downloaded,
    Installing,
    Installed,
    Other(String),
}

impl InstallState {
    pub fn label(&self) -> &str {
        match self {
            InstallState::Downloaded => "downloaded",
            InstallState::Installing => "installing",
            InstallState::Installed => "installed",
            InstallState::Other(raw) => raw,
        }
    }
}

impl From<String> for InstallState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "downloaded" => InstallState::Downloaded,
            "installing" => InstallState::Installing,
            "installed" => InstallState::Installed,
            _ => InstallState::Other(raw),
        }
    }
}

impl From<InstallState> for String {
    fn from(state: InstallState) -> Self {
        match state {
            InstallState::Other(raw) => raw,
            known => known.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<InstallState>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl ModEntry {
    pub fn new(id: &str, name: &str, state: Option<InstallState>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            state,
            attributes: BTreeMap::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Any recorded value counts, including an explicit null.
    pub fn was_installed(&self) -> bool {
        self.attributes.contains_key(WAS_INSTALLED_ATTRIBUTE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock error")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "refprofile-library-{}-{}-{}",
            name,
            std::process::id(),
            stamp
        ));
        fs::create_dir_all(&path).expect("create temp dir");
        path
    }

    #[test]
    fn creates_seeded_library_when_missing() {
        let dir = temp_dir("seed");
        let library = Library::load_or_create(&dir).expect("load library");
        assert_eq!(library.active_profile.as_deref(), Some("default"));
        assert!(library.profiles.contains_key("default"));
        assert!(dir.join(LIBRARY_FILE).exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn parses_host_layout_and_repairs_ids() {
        let dir = temp_dir("parse");
        let raw = r#"{
            "active_profile": "gone",
            "profiles": {
                "p1": { "id": "stale", "game_id": "skyrim", "name": "Main",
                        "features": { "reference_profile": "p2" },
                        "mod_state": { "m1": { "enabled": true } } },
                "p2": { "id": "p2", "game_id": "skyrim", "name": "Test" }
            },
            "mods": {
                "skyrim": {
                    "m1": { "id": "m1", "name": "One", "state": "installed" },
                    "m2": { "id": "m2", "name": "Two", "state": "downloaded",
                            "attributes": { "wasInstalled": null } }
                }
            }
        }"#;
        fs::write(dir.join(LIBRARY_FILE), raw).expect("write fixture");

        let library = Library::load_or_create(&dir).expect("load library");
        assert_eq!(library.active_profile.as_deref(), Some("p1"));
        let main = &library.profiles["p1"];
        assert_eq!(main.id, "p1");
        assert_eq!(main.feature_str("reference_profile"), Some("p2"));
        assert!(main.is_mod_enabled("m1"));
        assert!(!main.is_mod_enabled("m2"));

        let mods = &library.mods["skyrim"];
        assert_eq!(mods["m1"].state, Some(InstallState::Installed));
        assert!(mods["m2"].was_installed());
        assert!(!mods["m1"].was_installed());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_install_states_survive_a_round_trip() {
        let dir = temp_dir("other-state");
        let raw = r#"{
            "profiles": {},
            "mods": {
                "skyrim": {
                    "m1": { "id": "m1", "name": "One", "state": "downloading" },
                    "m2": { "id": "m2", "name": "Two", "state": "installed" }
                }
            }
        }"#;
        fs::write(dir.join(LIBRARY_FILE), raw).expect("write fixture");

        let library = Library::load_or_create(&dir).expect("load library");
        let mods = &library.mods["skyrim"];
        assert_eq!(mods["m1"].state, Some(InstallState::Other("downloading".to_string())));
        assert_eq!(mods["m2"].state, Some(InstallState::Installed));

        library.save(&dir).expect("save library");
        let saved = fs::read_to_string(dir.join(LIBRARY_FILE)).expect("read library");
        assert!(saved.contains("\"downloading\""));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn reports_parse_errors_with_path() {
        let dir = temp_dir("broken");
        fs::write(dir.join(LIBRARY_FILE), "{ not json").expect("write fixture");
        let err = Library::load_or_create(&dir).expect_err("broken library must fail");
        assert!(matches!(err, LibraryError::Parse { .. }));
        assert!(err.to_string().contains(LIBRARY_FILE));
        let _ = fs::remove_dir_all(&dir);
    }
}

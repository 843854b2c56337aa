use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ChatResult;
use crate::storage::ensure_parent_dir;

pub const DEFAULT_PREFERENCES_PATH: &str = "data/preferences.json";

/// The two display preferences kept on the local machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_color: Option<String>,
}

/// JSON file holding [`Preferences`].
#[derive(Debug, Clone)]
pub struct PreferenceFile {
    path: PathBuf,
}

impl PreferenceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files yield empty preferences.
    pub fn load(&self) -> Preferences {
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<Preferences>(&content) {
                Ok(prefs) => prefs,
                Err(err) => {
                    log::warn!(
                        "Failed to parse preferences {} ({err}); starting fresh",
                        self.path.display()
                    );
                    Preferences::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Preferences::default(),
            Err(err) => {
                log::warn!("Failed to read preferences {} ({err})", self.path.display());
                Preferences::default()
            }
        }
    }

    pub fn save(&self, prefs: &Preferences) -> ChatResult<()> {
        ensure_parent_dir(&self.path)?;
        let json = serde_json::to_string_pretty(prefs)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

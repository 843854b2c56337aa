//! Local participant identity: display name, avatar color and the
//! participant id issued by anonymous sign-in.

mod preferences;

pub use preferences::{DEFAULT_PREFERENCES_PATH, PreferenceFile, Preferences};

use std::sync::LazyLock;

use rand::Rng;
use rand::seq::IndexedRandom;
use regex::Regex;

use crate::common::Identity;
use crate::error::{ChatError, ChatResult};

pub const PALETTE: [&str; 19] = [
    "#F56565", "#48BB78", "#4299E1", "#ED8936", "#9F7AEA", "#ECC94B", "#34D399", "#60A5FA",
    "#FBBF24", "#A78BFA", "#f472b6", "#4ade80", "#38bdf8", "#facc15", "#fb923c", "#c084fc",
    "#f43f5e", "#22d3ee", "#bef264",
];

static COLOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#[0-9A-Fa-f]{6}|[A-Za-z]+)$").expect("color pattern is valid")
});

/// `#RRGGBB` or a named color made of letters.
pub fn is_valid_color(color: &str) -> bool {
    COLOR_PATTERN.is_match(color)
}

pub fn generate_display_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("User{}", rng.random_range(100..=999))
}

/// Palette picker that never hands out the same color twice in a row.
#[derive(Debug, Clone, Default)]
pub struct ColorPicker {
    last: Option<String>,
}

impl ColorPicker {
    pub fn pick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        let candidates: Vec<&str> = PALETTE
            .iter()
            .copied()
            .filter(|color| Some(*color) != self.last.as_deref())
            .collect();
        let color = candidates
            .choose(rng)
            .copied()
            .unwrap_or(PALETTE[0])
            .to_string();
        self.last = Some(color.clone());
        color
    }

    /// Record a color chosen outside the picker.
    pub fn remember(&mut self, color: &str) {
        self.last = Some(color.to_string());
    }
}

/// Owns the session identity and keeps the preference file in sync.
///
/// Name and color may only change before sign-in binds a participant id;
/// after that the identity is fixed for the rest of the session.
pub struct IdentityStore {
    identity: Identity,
    colors: ColorPicker,
    file: PreferenceFile,
}

impl IdentityStore {
    pub fn load(file: PreferenceFile) -> Self {
        Self::load_with_rng(file, &mut rand::rng())
    }

    /// Seed from persisted preferences, generating anything missing or invalid.
    pub fn load_with_rng<R: Rng + ?Sized>(file: PreferenceFile, rng: &mut R) -> Self {
        let prefs = file.load();
        let mut colors = ColorPicker::default();

        let display_name = prefs
            .display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| generate_display_name(rng));

        let avatar_color = match prefs.avatar_color.filter(|color| is_valid_color(color)) {
            Some(color) => {
                colors.remember(&color);
                color
            }
            None => colors.pick(rng),
        };

        let store = Self {
            identity: Identity {
                display_name,
                avatar_color,
                participant_id: String::new(),
            },
            colors,
            file,
        };
        if let Err(err) = store.persist() {
            log::warn!("Failed to persist preferences: {err}");
        }
        log::info!(
            "Identity loaded: {} ({})",
            store.identity.display_name,
            store.identity.avatar_color
        );
        store
    }

    pub fn identity(&self) -> Identity {
        self.identity.clone()
    }

    pub fn participant_id(&self) -> &str {
        &self.identity.participant_id
    }

    pub fn set_display_name(&mut self, name: &str) -> ChatResult<()> {
        self.ensure_unbound()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::InvalidPreference(
                "display name cannot be empty".to_string(),
            ));
        }
        self.identity.display_name = name.to_string();
        self.persist()
    }

    pub fn set_avatar_color(&mut self, color: &str) -> ChatResult<()> {
        self.ensure_unbound()?;
        let color = color.trim();
        if !is_valid_color(color) {
            return Err(ChatError::InvalidPreference(format!(
                "`{color}` is not a #RRGGBB or named color"
            )));
        }
        self.colors.remember(color);
        self.identity.avatar_color = color.to_string();
        self.persist()
    }

    /// Set the participant id once. Later calls are ignored and return false.
    pub fn assign_participant_id(&mut self, participant_id: String) -> bool {
        if !self.identity.participant_id.is_empty() {
            log::warn!(
                "Ignoring participant id {participant_id}; session already bound to {}",
                self.identity.participant_id
            );
            return false;
        }
        self.identity.participant_id = participant_id;
        true
    }

    fn ensure_unbound(&self) -> ChatResult<()> {
        if self.identity.participant_id.is_empty() {
            Ok(())
        } else {
            Err(ChatError::InvalidPreference(
                "identity is fixed once signed in".to_string(),
            ))
        }
    }

    fn persist(&self) -> ChatResult<()> {
        self.file.save(&Preferences {
            display_name: Some(self.identity.display_name.clone()),
            avatar_color: Some(self.identity.avatar_color.clone()),
        })
    }
}

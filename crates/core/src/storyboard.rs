//! Storyboard types and validation.
//!
//! The provider returns a loosely-typed [`StoryboardDraft`]; the pipeline
//! only ever works with a [`Storyboard`] produced by
//! [`Storyboard::from_draft`], which enforces the scene-count and ordering
//! rules.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::SceneIndex;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default number of scenes per storyboard (12 × 5 s clips = 60 s reel).
pub const DEFAULT_SCENE_COUNT: u32 = 12;

/// Upper bound accepted for a configured scene count.
pub const MAX_SCENE_COUNT: u32 = 64;

/// Sound effect used when the storyboard does not name one.
pub const DEFAULT_SOUND_EFFECT: &str = "ambient";

// ---------------------------------------------------------------------------
// Draft (wire form)
// ---------------------------------------------------------------------------

/// A storyboard as returned by the storyboard capability, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryboardDraft {
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub sound_effect: Option<String>,
    #[serde(default)]
    pub scenes: Vec<SceneDraft>,
}

/// One scene of a [`StoryboardDraft`].
///
/// Generative models emit `scene_number` either as a number or a numeric
/// string, so it is kept as raw JSON until validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneDraft {
    #[serde(default)]
    pub scene_number: Option<serde_json::Value>,
    #[serde(default)]
    pub setting: Option<String>,
    #[serde(default)]
    pub description: String,
}

// ---------------------------------------------------------------------------
// Validated storyboard
// ---------------------------------------------------------------------------

/// The single character shared by every scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub description: String,
}

/// An immutable scene of a validated storyboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    pub index: SceneIndex,
    pub description: String,
    /// Location, lighting and atmosphere. Only required for scene 1.
    pub setting: Option<String>,
}

/// Character plus ordered scene descriptors for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storyboard {
    character: Character,
    scenes: Vec<SceneDescriptor>,
    sound_effect: String,
}

impl Storyboard {
    /// Validate a provider draft against the expected scene count.
    ///
    /// - At least one character; only the first is used.
    /// - Exactly `expected_scenes` scenes.
    /// - Scene numbers, when present, are `1..=N` in order. Missing numbers
    ///   are assigned by position.
    /// - Every description is non-empty; scene 1 has a non-empty setting.
    pub fn from_draft(draft: StoryboardDraft, expected_scenes: u32) -> Result<Self, CoreError> {
        validate_scene_count(expected_scenes)?;

        let character = draft
            .characters
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::Validation("storyboard has no character".to_string()))?;
        if character.description.trim().is_empty() {
            return Err(CoreError::Validation(
                "character description must not be empty".to_string(),
            ));
        }

        if draft.scenes.len() != expected_scenes as usize {
            return Err(CoreError::Validation(format!(
                "storyboard must have exactly {expected_scenes} scenes, got {}",
                draft.scenes.len()
            )));
        }

        let mut scenes = Vec::with_capacity(draft.scenes.len());
        for (index, raw) in SceneIndex::range(expected_scenes).zip(draft.scenes) {
            if let Some(number) = raw.scene_number.as_ref().and_then(parse_scene_number) {
                if number != index.get() {
                    return Err(CoreError::Validation(format!(
                        "scene numbers must be contiguous from 1: expected {index}, got {number}"
                    )));
                }
            }
            let description = raw.description.trim().to_string();
            if description.is_empty() {
                return Err(CoreError::Validation(format!(
                    "scene {index} has an empty description"
                )));
            }
            let setting = raw
                .setting
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            scenes.push(SceneDescriptor {
                index,
                description,
                setting,
            });
        }

        if scenes[0].setting.is_none() {
            return Err(CoreError::Validation(
                "scene 1 must describe the setting".to_string(),
            ));
        }

        let sound_effect = draft
            .sound_effect
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SOUND_EFFECT.to_string());

        Ok(Self {
            character,
            scenes,
            sound_effect,
        })
    }

    pub fn character(&self) -> &Character {
        &self.character
    }

    pub fn scenes(&self) -> &[SceneDescriptor] {
        &self.scenes
    }

    pub fn scene(&self, index: SceneIndex) -> Option<&SceneDescriptor> {
        self.scenes.get(index.offset())
    }

    pub fn scene_count(&self) -> u32 {
        self.scenes.len() as u32
    }

    pub fn sound_effect(&self) -> &str {
        &self.sound_effect
    }

    /// Setting description of the opening scene.
    pub fn opening_setting(&self) -> &str {
        self.scenes
            .first()
            .and_then(|s| s.setting.as_deref())
            .unwrap_or_default()
    }
}

/// Validate a configured scene count.
pub fn validate_scene_count(count: u32) -> Result<(), CoreError> {
    if count == 0 || count > MAX_SCENE_COUNT {
        return Err(CoreError::Validation(format!(
            "scene count must be between 1 and {MAX_SCENE_COUNT}, got {count}"
        )));
    }
    Ok(())
}

/// Accept `3`, `"3"` or `" 3 "`.
fn parse_scene_number(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn draft(scene_count: usize) -> StoryboardDraft {
        let scenes = (1..=scene_count)
            .map(|n| SceneDraft {
                scene_number: Some(json!(n.to_string())),
                setting: (n == 1).then(|| "A sunlit attic studio".to_string()),
                description: format!("The robot does thing {n}"),
            })
            .collect();
        StoryboardDraft {
            characters: vec![Character {
                name: "Unit 7".to_string(),
                description: "A small rusted robot".to_string(),
            }],
            sound_effect: Some("rain".to_string()),
            scenes,
        }
    }

    #[test]
    fn valid_draft_produces_ordered_storyboard() {
        let board = Storyboard::from_draft(draft(12), 12).unwrap();
        assert_eq!(board.scene_count(), 12);
        assert_eq!(board.character().name, "Unit 7");
        assert_eq!(board.sound_effect(), "rain");
        assert_eq!(board.opening_setting(), "A sunlit attic studio");
        for (i, scene) in board.scenes().iter().enumerate() {
            assert_eq!(scene.index.get() as usize, i + 1);
        }
    }

    #[test]
    fn wrong_scene_count_rejected() {
        let err = Storyboard::from_draft(draft(11), 12).unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg.contains("exactly 12"));
    }

    #[test]
    fn missing_character_rejected() {
        let mut d = draft(3);
        d.characters.clear();
        assert_matches!(
            Storyboard::from_draft(d, 3),
            Err(CoreError::Validation(msg)) if msg.contains("no character")
        );
    }

    #[test]
    fn out_of_order_scene_numbers_rejected() {
        let mut d = draft(3);
        d.scenes[1].scene_number = Some(json!(3));
        assert_matches!(
            Storyboard::from_draft(d, 3),
            Err(CoreError::Validation(msg)) if msg.contains("contiguous")
        );
    }

    #[test]
    fn unnumbered_scenes_numbered_by_position() {
        let mut d = draft(3);
        for scene in &mut d.scenes {
            scene.scene_number = None;
        }
        let board = Storyboard::from_draft(d, 3).unwrap();
        assert_eq!(board.scenes()[2].index.get(), 3);
    }

    #[test]
    fn numeric_scene_numbers_accepted() {
        let mut d = draft(2);
        d.scenes[0].scene_number = Some(json!(1));
        d.scenes[1].scene_number = Some(json!(2));
        assert!(Storyboard::from_draft(d, 2).is_ok());
    }

    #[test]
    fn first_scene_without_setting_rejected() {
        let mut d = draft(2);
        d.scenes[0].setting = Some("   ".to_string());
        assert_matches!(
            Storyboard::from_draft(d, 2),
            Err(CoreError::Validation(msg)) if msg.contains("setting")
        );
    }

    #[test]
    fn later_scenes_may_omit_setting() {
        let board = Storyboard::from_draft(draft(4), 4).unwrap();
        assert!(board.scenes()[3].setting.is_none());
    }

    #[test]
    fn empty_description_rejected() {
        let mut d = draft(2);
        d.scenes[1].description = String::new();
        assert_matches!(
            Storyboard::from_draft(d, 2),
            Err(CoreError::Validation(msg)) if msg.contains("scene 2")
        );
    }

    #[test]
    fn missing_sound_effect_defaults_to_ambient() {
        let mut d = draft(1);
        d.sound_effect = None;
        let board = Storyboard::from_draft(d, 1).unwrap();
        assert_eq!(board.sound_effect(), DEFAULT_SOUND_EFFECT);
    }

    #[test]
    fn scene_count_bounds() {
        assert!(validate_scene_count(0).is_err());
        assert!(validate_scene_count(1).is_ok());
        assert!(validate_scene_count(MAX_SCENE_COUNT).is_ok());
        assert!(validate_scene_count(MAX_SCENE_COUNT + 1).is_err());
    }

    #[test]
    fn draft_parses_provider_json() {
        let raw = json!({
            "characters": [{"name": "Sarah", "description": "A woman in her 30s"}],
            "sound_effect": "rain",
            "scenes": [
                {"scene_number": "1", "setting": "Rainy window", "description": "She watches the storm."},
                {"scene_number": "2", "setting": "", "description": "She sips tea."}
            ]
        });
        let d: StoryboardDraft = serde_json::from_value(raw).unwrap();
        let board = Storyboard::from_draft(d, 2).unwrap();
        assert_eq!(board.scenes()[1].description, "She sips tea.");
        assert!(board.scenes()[1].setting.is_none());
    }
}

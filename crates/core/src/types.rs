//! Shared identifiers: scene indices, pipeline stages and artifacts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

// ---------------------------------------------------------------------------
// SceneIndex
// ---------------------------------------------------------------------------

/// 1-based position of a scene in the storyboard.
///
/// Scene order is narrative order: it fixes generation order and the order
/// in which clips are concatenated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SceneIndex(u32);

impl SceneIndex {
    /// The opening scene. Owns the shared character and setting artifacts.
    pub const FIRST: SceneIndex = SceneIndex(1);

    /// Build an index, rejecting `0`.
    pub fn new(index: u32) -> Result<Self, CoreError> {
        if index == 0 {
            return Err(CoreError::Validation(
                "scene index is 1-based, got 0".to_string(),
            ));
        }
        Ok(Self(index))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn next(self) -> SceneIndex {
        SceneIndex(self.0 + 1)
    }

    pub fn previous(self) -> Option<SceneIndex> {
        (self.0 > 1).then(|| SceneIndex(self.0 - 1))
    }

    /// Position of this scene relative to the storyboard boundary.
    pub fn position(self) -> ScenePosition {
        match self.previous() {
            None => ScenePosition::First,
            Some(previous) => ScenePosition::Subsequent { previous },
        }
    }

    /// Zero-based offset into per-scene vectors.
    pub fn offset(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Iterate `1..=count`.
    pub fn range(count: u32) -> impl Iterator<Item = SceneIndex> {
        (1..=count).map(SceneIndex)
    }
}

impl TryFrom<u32> for SceneIndex {
    type Error = CoreError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        SceneIndex::new(value)
    }
}

impl From<SceneIndex> for u32 {
    fn from(index: SceneIndex) -> Self {
        index.0
    }
}

impl fmt::Display for SceneIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a scene sits relative to the storyboard boundary.
///
/// The first scene builds its starting image from the character and a fresh
/// setting; every later scene starts from a frame of the previous scene's
/// video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenePosition {
    First,
    Subsequent { previous: SceneIndex },
}

impl ScenePosition {
    /// The stage a scene in this position runs first.
    pub fn first_stage(self) -> Stage {
        match self {
            ScenePosition::First => Stage::SettingPrompt,
            ScenePosition::Subsequent { .. } => Stage::ExtractFrame,
        }
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A single generation capability invoked by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Storyboard,
    CharacterPrompt,
    CharacterImage,
    SettingPrompt,
    SettingImage,
    CombinePrompt,
    CombineImage,
    ExtractFrame,
    VideoPrompt,
    GenerateVideo,
    AddSoundEffect,
    MergeVideos,
}

impl Stage {
    pub const ALL: [Stage; 12] = [
        Stage::Storyboard,
        Stage::CharacterPrompt,
        Stage::CharacterImage,
        Stage::SettingPrompt,
        Stage::SettingImage,
        Stage::CombinePrompt,
        Stage::CombineImage,
        Stage::ExtractFrame,
        Stage::VideoPrompt,
        Stage::GenerateVideo,
        Stage::AddSoundEffect,
        Stage::MergeVideos,
    ];

    /// Stable kebab-case name, also the provider endpoint path segment.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Storyboard => "storyboard",
            Stage::CharacterPrompt => "character-prompt",
            Stage::CharacterImage => "character-image",
            Stage::SettingPrompt => "setting-prompt",
            Stage::SettingImage => "setting-image",
            Stage::CombinePrompt => "combine-prompt",
            Stage::CombineImage => "combine-image",
            Stage::ExtractFrame => "extract-frame",
            Stage::VideoPrompt => "video-prompt",
            Stage::GenerateVideo => "generate-video",
            Stage::AddSoundEffect => "add-sound-effect",
            Stage::MergeVideos => "merge-videos",
        }
    }

    /// Video stages run much longer than prompt or image stages.
    pub fn is_video(self) -> bool {
        matches!(
            self,
            Stage::GenerateVideo | Stage::AddSoundEffect | Stage::MergeVideos
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// What a generated media object is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    CharacterImage,
    SettingImage,
    CombinedImage,
    FrameImage,
    SceneVideo,
    /// A scene video with the ambient sound effect mixed in.
    ScoredVideo,
    FinalVideo,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::CharacterImage => "character-image",
            ArtifactKind::SettingImage => "setting-image",
            ArtifactKind::CombinedImage => "combined-image",
            ArtifactKind::FrameImage => "frame-image",
            ArtifactKind::SceneVideo => "scene-video",
            ArtifactKind::ScoredVideo => "scored-video",
            ArtifactKind::FinalVideo => "final-video",
        }
    }

    pub fn is_video(self) -> bool {
        matches!(
            self,
            ArtifactKind::SceneVideo | ArtifactKind::ScoredVideo | ArtifactKind::FinalVideo
        )
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of an artifact inside the [`ArtifactStore`](crate::ArtifactStore).
///
/// Scene records hold these back-references instead of copies, so the
/// shared character and setting artifacts exist exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub scene: SceneIndex,
    pub kind: ArtifactKind,
}

impl ArtifactRef {
    pub fn new(scene: SceneIndex, kind: ArtifactKind) -> Self {
        Self { scene, kind }
    }
}

/// Reference to a generated media object.
///
/// `locator` is opaque to the pipeline: usually an `https://` URL returned
/// by the provider, a `file://` path for locally produced media, or an
/// `offline://` placeholder from the offline backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    pub scene: SceneIndex,
    pub kind: ArtifactKind,
    pub locator: String,
}

impl Artifact {
    pub fn new(scene: SceneIndex, kind: ArtifactKind, locator: impl Into<String>) -> Self {
        Self {
            scene,
            kind,
            locator: locator.into(),
        }
    }

    pub fn reference(&self) -> ArtifactRef {
        ArtifactRef::new(self.scene, self.kind)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn idx(n: u32) -> SceneIndex {
        SceneIndex::new(n).unwrap()
    }

    #[test]
    fn zero_scene_index_rejected() {
        assert_matches!(SceneIndex::new(0), Err(CoreError::Validation(_)));
    }

    #[test]
    fn first_scene_position() {
        assert_eq!(SceneIndex::FIRST.position(), ScenePosition::First);
    }

    #[test]
    fn subsequent_scene_points_at_previous() {
        assert_eq!(
            idx(2).position(),
            ScenePosition::Subsequent { previous: idx(1) }
        );
        assert_eq!(
            idx(12).position(),
            ScenePosition::Subsequent { previous: idx(11) }
        );
    }

    #[test]
    fn only_the_first_scene_starts_with_the_setting() {
        assert_eq!(SceneIndex::FIRST.position().first_stage(), Stage::SettingPrompt);
        assert_eq!(idx(2).position().first_stage(), Stage::ExtractFrame);
    }

    #[test]
    fn range_is_one_based_and_inclusive() {
        let all: Vec<u32> = SceneIndex::range(3).map(SceneIndex::get).collect();
        assert_eq!(all, vec![1, 2, 3]);
        assert_eq!(SceneIndex::range(0).count(), 0);
    }

    #[test]
    fn offset_is_zero_based() {
        assert_eq!(SceneIndex::FIRST.offset(), 0);
        assert_eq!(idx(5).offset(), 4);
    }

    #[test]
    fn scene_index_deserialize_rejects_zero() {
        assert!(serde_json::from_str::<SceneIndex>("0").is_err());
        assert_eq!(serde_json::from_str::<SceneIndex>("4").unwrap(), idx(4));
    }

    #[test]
    fn stage_names_match_serde() {
        for stage in Stage::ALL {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage.as_str()));
        }
    }

    #[test]
    fn artifact_kind_names_match_serde() {
        let json = serde_json::to_string(&ArtifactKind::CombinedImage).unwrap();
        assert_eq!(json, "\"combined-image\"");
    }

    #[test]
    fn artifact_reference_keys_scene_and_kind() {
        let artifact = Artifact::new(idx(3), ArtifactKind::FrameImage, "https://cdn/f.png");
        assert_eq!(
            artifact.reference(),
            ArtifactRef::new(idx(3), ArtifactKind::FrameImage)
        );
    }
}

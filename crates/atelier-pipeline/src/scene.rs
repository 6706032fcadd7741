//! Staging scenes and the presets offered to the artist.
//!
//! The staging endpoint only understands four scene names. Presets layer
//! a descriptive prompt on top of one of them; the artist's own prompt is
//! appended after the preset's.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A scene name understood by the staging endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scene {
    /// Artwork on a wooden easel.
    #[default]
    Easel,
    /// Artwork hung on a wall.
    Wall,
    /// Artwork in a gallery space.
    Gallery,
    /// Artwork in a studio.
    Studio,
}

impl Scene {
    /// The wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easel => "easel",
            Self::Wall => "wall",
            Self::Gallery => "gallery",
            Self::Studio => "studio",
        }
    }
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised scene or preset name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} {name:?}")]
pub struct UnknownName {
    kind: &'static str,
    name: String,
}

impl FromStr for Scene {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easel" => Ok(Self::Easel),
            "wall" => Ok(Self::Wall),
            "gallery" => Ok(Self::Gallery),
            "studio" => Ok(Self::Studio),
            _ => Err(UnknownName {
                kind: "scene",
                name: s.to_owned(),
            }),
        }
    }
}

/// One entry in the staging preset picker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenePreset {
    /// Plain easel.
    #[default]
    Easel,
    /// Plain wall.
    Wall,
    /// Contemporary gallery.
    Gallery,
    /// Artist studio.
    Studio,
    /// Wooden table in a living room.
    TableRoom,
    /// Light-wood desk by a window.
    MinimalDesk,
    /// Coffee shop table.
    CoffeeTable,
}

impl ScenePreset {
    /// Every preset, in picker order.
    pub const ALL: [Self; 7] = [
        Self::Easel,
        Self::Wall,
        Self::Gallery,
        Self::Studio,
        Self::TableRoom,
        Self::MinimalDesk,
        Self::CoffeeTable,
    ];

    /// Stable identifier (`"table-room"` etc.).
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Easel => "easel",
            Self::Wall => "wall",
            Self::Gallery => "gallery",
            Self::Studio => "studio",
            Self::TableRoom => "table-room",
            Self::MinimalDesk => "minimal-desk",
            Self::CoffeeTable => "coffee-table",
        }
    }

    /// The endpoint scene this preset uses.
    #[must_use]
    pub const fn scene(self) -> Scene {
        match self {
            Self::Easel => Scene::Easel,
            Self::Wall => Scene::Wall,
            Self::Gallery => Scene::Gallery,
            Self::Studio | Self::TableRoom | Self::MinimalDesk | Self::CoffeeTable => Scene::Studio,
        }
    }

    /// Descriptive prompt sent ahead of the artist's own words.
    #[must_use]
    pub const fn prompt(self) -> &'static str {
        match self {
            Self::Easel | Self::Wall => "",
            Self::Gallery => {
                "in a clean, contemporary gallery with soft neutral walls and natural overhead lighting"
            }
            Self::Studio => {
                "in an artist studio with soft daylight, subtle clutter, and creative atmosphere"
            }
            Self::TableRoom => {
                "placed on a wooden table in a cozy, well-lit living room; warm ambient light and gentle depth of field"
            }
            Self::MinimalDesk => {
                "on a minimalist light-wood desk by a window with soft natural light and clean decor"
            }
            Self::CoffeeTable => {
                "on a rustic coffee shop table with soft bokeh background lights; warm, inviting atmosphere"
            }
        }
    }
}

impl fmt::Display for ScenePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ScenePreset {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.id() == wanted)
            .ok_or_else(|| UnknownName {
                kind: "preset",
                name: s.to_owned(),
            })
    }
}

/// Join the preset prompt and the artist's prompt with one space,
/// skipping whichever is blank.
#[must_use]
pub fn combine_prompt(preset: &str, extra: &str) -> String {
    [preset.trim(), extra.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn combine_omits_empty_parts() {
        assert_eq!(combine_prompt("", ""), "");
        assert_eq!(combine_prompt("a", ""), "a");
        assert_eq!(combine_prompt("", "b"), "b");
        assert_eq!(combine_prompt("a", "b"), "a b");
        assert_eq!(combine_prompt("  a ", "  b  "), "a b");
    }

    #[test]
    fn presets_map_onto_endpoint_scenes() {
        assert_eq!(ScenePreset::Gallery.scene(), Scene::Gallery);
        assert_eq!(ScenePreset::CoffeeTable.scene(), Scene::Studio);
        assert_eq!(ScenePreset::Wall.prompt(), "");
        assert!(ScenePreset::MinimalDesk.prompt().starts_with("on a minimalist"));
    }

    #[test]
    fn preset_ids_round_trip() {
        for preset in ScenePreset::ALL {
            assert_eq!(preset.id().parse::<ScenePreset>().unwrap(), preset);
        }
        assert!("attic".parse::<ScenePreset>().is_err());
    }

    #[test]
    fn preset_serde_uses_ids() {
        let json = serde_json::to_string(&ScenePreset::TableRoom).unwrap();
        assert_eq!(json, "\"table-room\"");
    }

    #[test]
    fn unknown_scene_is_rejected() {
        assert_eq!(" Studio ".parse::<Scene>().unwrap(), Scene::Studio);
        assert_eq!(
            "garage".parse::<Scene>().unwrap_err().to_string(),
            "unknown scene \"garage\""
        );
    }
}

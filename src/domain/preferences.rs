use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::persistence::codec::Schema;

/// Canonical age bands. Single-year values written by older builds are
/// read as the band starting at that year (`"7"` maps to the top band).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum AgeGroup {
    #[serde(rename = "3-4", alias = "3")]
    ThreeToFour,
    #[default]
    #[serde(rename = "4-5", alias = "4")]
    FourToFive,
    #[serde(rename = "5-6", alias = "5")]
    FiveToSix,
    #[serde(rename = "6-7", alias = "6", alias = "7")]
    SixToSeven,
}

impl AgeGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::ThreeToFour => "3-4",
            AgeGroup::FourToFive => "4-5",
            AgeGroup::FiveToSix => "5-6",
            AgeGroup::SixToSeven => "6-7",
        }
    }
}

impl std::fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSize {
    Small,
    #[default]
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// User settings. Unknown keys are kept in `extra` and written back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub sound_enabled: bool,
    pub music_enabled: bool,
    pub vibration_enabled: bool,
    pub hints_enabled: bool,
    pub age_group: AgeGroup,
    pub text_size: TextSize,
    pub high_contrast: bool,
    pub reduced_motion: bool,
    pub theme: Theme,
    pub language: String,
    /// Last local modification, ms since epoch. Zero means "never edited".
    pub updated_at: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            music_enabled: true,
            vibration_enabled: true,
            hints_enabled: true,
            age_group: AgeGroup::default(),
            text_size: TextSize::default(),
            high_contrast: false,
            reduced_motion: false,
            theme: Theme::default(),
            language: "en".to_string(),
            updated_at: 0,
            extra: BTreeMap::new(),
        }
    }
}

impl Schema for Preferences {
    const NAME: &'static str = "Preferences";
}

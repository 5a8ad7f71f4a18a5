use serde::{Deserialize, Serialize};

use crate::persistence::codec::Schema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    pub name: String,
    /// Set when progress first reaches 100. Never cleared, never moved later.
    #[serde(default)]
    pub unlocked_at: Option<u64>,
    /// Percentage in `0..=100`.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub updated_at: u64,
}

impl Achievement {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unlocked_at: None,
            progress: 0,
            updated_at: 0,
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked_at.is_some()
    }
}

impl Schema for Achievement {
    const NAME: &'static str = "Achievement";

    fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("empty achievement id".into());
        }
        if self.progress > 100 {
            return Err(format!("progress {} outside 0..=100", self.progress));
        }
        Ok(())
    }
}

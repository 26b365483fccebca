// Record identifier generation

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Produces a fresh unique identifier for a record created without an explicit `_id`.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Built-in identifier strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoIdStrategy {
    #[default]
    Uuid,
    Ulid,
    Nanoid,
}

impl IdGenerator for AutoIdStrategy {
    fn generate(&self) -> String {
        match self {
            AutoIdStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
            AutoIdStrategy::Ulid => ulid::Ulid::new().to_string().to_lowercase(),
            AutoIdStrategy::Nanoid => nanoid::nanoid!(),
        }
    }
}

impl FromStr for AutoIdStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uuid" => Ok(AutoIdStrategy::Uuid),
            "ulid" => Ok(AutoIdStrategy::Ulid),
            "nanoid" => Ok(AutoIdStrategy::Nanoid),
            other => Err(format!("unknown id strategy '{other}'")),
        }
    }
}

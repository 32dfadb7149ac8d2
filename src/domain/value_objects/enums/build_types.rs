use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// One billable content-generation action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildType {
    Mvp,
    Branding,
    Marketing,
}

impl Display for BuildType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let build_type = match self {
            BuildType::Mvp => "mvp",
            BuildType::Branding => "branding",
            BuildType::Marketing => "marketing",
        };
        write!(f, "{}", build_type)
    }
}

impl BuildType {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "mvp" => Some(BuildType::Mvp),
            "branding" => Some(BuildType::Branding),
            "marketing" => Some(BuildType::Marketing),
            _ => None,
        }
    }
}

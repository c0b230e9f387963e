use core::str::FromStr;

use serde::{Deserialize, Serialize};

use washline_core::DomainError;

/// Processing stage of an order, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Entry,
    Tagging,
    Washing,
    Packing,
    Delivery,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Entry,
        Stage::Tagging,
        Stage::Washing,
        Stage::Packing,
        Stage::Delivery,
    ];

    /// The stage after this one; `None` for the last stage.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Entry => Some(Stage::Tagging),
            Stage::Tagging => Some(Stage::Washing),
            Stage::Washing => Some(Stage::Packing),
            Stage::Packing => Some(Stage::Delivery),
            Stage::Delivery => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Entry => "entry",
            Stage::Tagging => "tagging",
            Stage::Washing => "washing",
            Stage::Packing => "packing",
            Stage::Delivery => "delivery",
        }
    }
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown stage '{s}'")))
    }
}

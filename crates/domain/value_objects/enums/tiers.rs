use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Named subscription level. Rank ordering drives upgrade/downgrade validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Tier {
    C1,
    C2,
    C3,
}

impl Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tier = match self {
            Tier::C1 => "C1",
            Tier::C2 => "C2",
            Tier::C3 => "C3",
        };
        write!(f, "{}", tier)
    }
}

impl Tier {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "C1" => Some(Tier::C1),
            "C2" => Some(Tier::C2),
            "C3" => Some(Tier::C3),
            _ => None,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Tier::C1 => 1,
            Tier::C2 => 2,
            Tier::C3 => 3,
        }
    }
}

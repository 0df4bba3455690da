//! Product kinds and the dispatch table that maps them to their stored form.
//!
//! Products are sold either directly or through one of several activities. Each kind stores
//! its SKU rows under its own `product_type` code, and activity kinds additionally key their
//! rows by the activity id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::ActivityId;

/// The kind of product a SKU row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProductKind {
    Ordinary,
    Seckill { activity_id: ActivityId },
    Presell { activity_id: ActivityId },
    Assist { activity_id: ActivityId },
    Group { activity_id: ActivityId },
}

struct KindProfile {
    code: i16,
    name: &'static str,
    needs_activity: bool,
    build: fn(ActivityId) -> ProductKind,
}

// Indexed by product_type code.
static PROFILES: [KindProfile; 5] = [
    KindProfile {
        code: 0,
        name: "ordinary",
        needs_activity: false,
        build: ordinary,
    },
    KindProfile {
        code: 1,
        name: "seckill",
        needs_activity: true,
        build: seckill,
    },
    KindProfile {
        code: 2,
        name: "presell",
        needs_activity: true,
        build: presell,
    },
    KindProfile {
        code: 3,
        name: "assist",
        needs_activity: true,
        build: assist,
    },
    KindProfile {
        code: 4,
        name: "group",
        needs_activity: true,
        build: group,
    },
];

fn ordinary(_: ActivityId) -> ProductKind {
    ProductKind::Ordinary
}

fn seckill(activity_id: ActivityId) -> ProductKind {
    ProductKind::Seckill { activity_id }
}

fn presell(activity_id: ActivityId) -> ProductKind {
    ProductKind::Presell { activity_id }
}

fn assist(activity_id: ActivityId) -> ProductKind {
    ProductKind::Assist { activity_id }
}

fn group(activity_id: ActivityId) -> ProductKind {
    ProductKind::Group { activity_id }
}

impl ProductKind {
    /// The `product_type` code stored alongside SKU rows
    pub fn code(&self) -> i16 {
        match self {
            ProductKind::Ordinary => 0,
            ProductKind::Seckill { .. } => 1,
            ProductKind::Presell { .. } => 2,
            ProductKind::Assist { .. } => 3,
            ProductKind::Group { .. } => 4,
        }
    }

    /// Activity id, or 0 for ordinary products
    pub fn activity_id(&self) -> ActivityId {
        match *self {
            ProductKind::Ordinary => 0,
            ProductKind::Seckill { activity_id }
            | ProductKind::Presell { activity_id }
            | ProductKind::Assist { activity_id }
            | ProductKind::Group { activity_id } => activity_id,
        }
    }

    pub fn name(&self) -> &'static str {
        self.profile().name
    }

    fn profile(&self) -> &'static KindProfile {
        &PROFILES[self.code() as usize]
    }

    fn from_profile(profile: &KindProfile, activity_id: ActivityId) -> Result<Self, String> {
        if profile.needs_activity && activity_id <= 0 {
            return Err(format!("{} products require a positive activity id", profile.name));
        }
        if !profile.needs_activity && activity_id != 0 {
            return Err(format!("{} products do not take an activity id", profile.name));
        }
        Ok((profile.build)(activity_id))
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.profile().needs_activity {
            write!(f, "{}:{}", self.name(), self.activity_id())
        } else {
            write!(f, "{}", self.name())
        }
    }
}

/// Parses `ordinary` or `<kind>:<activity_id>` (e.g. `seckill:12`).
impl FromStr for ProductKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, activity) = match s.split_once(':') {
            Some((name, activity)) => (name, Some(activity)),
            None => (s, None),
        };
        let profile = PROFILES
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| format!("unknown product kind '{name}'"))?;
        let activity_id = match activity {
            Some(raw) => raw.trim().parse::<ActivityId>().map_err(|e| format!("invalid activity id '{raw}': {e}"))?,
            None => 0,
        };
        Self::from_profile(profile, activity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_profile_table() {
        let kinds = [
            ProductKind::Ordinary,
            ProductKind::Seckill { activity_id: 3 },
            ProductKind::Presell { activity_id: 3 },
            ProductKind::Assist { activity_id: 3 },
            ProductKind::Group { activity_id: 3 },
        ];
        for kind in kinds {
            assert_eq!(PROFILES[kind.code() as usize].code, kind.code());
            assert_eq!(kind.to_string().parse::<ProductKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_activity_id_must_match_kind() {
        assert!("ordinary:5".parse::<ProductKind>().is_err());
        assert!("seckill:0".parse::<ProductKind>().is_err());
        assert!("group:-2".parse::<ProductKind>().is_err());
        assert_eq!("group:8".parse::<ProductKind>().unwrap(), ProductKind::Group { activity_id: 8 });
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("ordinary".parse::<ProductKind>().unwrap(), ProductKind::Ordinary);
        assert_eq!("Seckill:12".parse::<ProductKind>().unwrap(), ProductKind::Seckill { activity_id: 12 });
        assert!("presell".parse::<ProductKind>().is_err());
        assert!("lottery:1".parse::<ProductKind>().is_err());
        assert_eq!(ProductKind::Presell { activity_id: 4 }.to_string(), "presell:4");
        assert_eq!(ProductKind::Ordinary.to_string(), "ordinary");
    }
}

//! Closed status and classification vocabularies.
//!
//! Every outcome an operation can report is one of these variants; wire
//! names are the literal strings clients already understand.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a target existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocStatus {
    Error,
    Exist,
    NotFound,
}

/// Outcome of a movement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveStatus {
    Error,
    Moved,
    NotMoved,
    NotFound,
}

/// Outcome of an add / remove / change mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AddRemoveStatus {
    Error,
    Added,
    Removed,
    Changed,
    NotAdded,
    NotRemoved,
    NotFound,
}

/// Where an entity sits in the observer's camera view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CamPos {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "front")]
    Front,
    #[serde(rename = "upper")]
    Upper,
    #[serde(rename = "lower")]
    Lower,
    #[serde(rename = "left")]
    Left,
    #[serde(rename = "right")]
    Right,
    #[serde(rename = "upper right")]
    UpperRight,
    #[serde(rename = "upper left")]
    UpperLeft,
    #[serde(rename = "lower right")]
    LowerRight,
    #[serde(rename = "lower left")]
    LowerLeft,
}

/// How far away an entity appears, relative to the view radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CamDist {
    #[serde(rename = "")]
    Unknown,
    #[serde(rename = "very close")]
    VeryClose,
    #[serde(rename = "close")]
    Close,
    #[serde(rename = "in distance")]
    InDistance,
    #[serde(rename = "in very far away")]
    VeryFarAway,
}

impl LocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocStatus::Error => "error",
            LocStatus::Exist => "exist",
            LocStatus::NotFound => "notFound",
        }
    }
}

impl MoveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveStatus::Error => "error",
            MoveStatus::Moved => "moved",
            MoveStatus::NotMoved => "notMoved",
            MoveStatus::NotFound => "notFound",
        }
    }
}

impl AddRemoveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddRemoveStatus::Error => "error",
            AddRemoveStatus::Added => "added",
            AddRemoveStatus::Removed => "removed",
            AddRemoveStatus::Changed => "changed",
            AddRemoveStatus::NotAdded => "notAdded",
            AddRemoveStatus::NotRemoved => "notRemoved",
            AddRemoveStatus::NotFound => "notFound",
        }
    }
}

impl CamPos {
    pub fn as_str(&self) -> &'static str {
        match self {
            CamPos::None => "none",
            CamPos::Front => "front",
            CamPos::Upper => "upper",
            CamPos::Lower => "lower",
            CamPos::Left => "left",
            CamPos::Right => "right",
            CamPos::UpperRight => "upper right",
            CamPos::UpperLeft => "upper left",
            CamPos::LowerRight => "lower right",
            CamPos::LowerLeft => "lower left",
        }
    }
}

impl CamDist {
    pub fn as_str(&self) -> &'static str {
        match self {
            CamDist::Unknown => "",
            CamDist::VeryClose => "very close",
            CamDist::Close => "close",
            CamDist::InDistance => "in distance",
            CamDist::VeryFarAway => "in very far away",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(LocStatus, MoveStatus, AddRemoveStatus, CamPos, CamDist);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_display() {
        for pos in [CamPos::None, CamPos::UpperLeft, CamPos::LowerRight, CamPos::Front] {
            let json = serde_json::to_value(pos).unwrap();
            assert_eq!(json, pos.as_str());
        }
        for dist in [CamDist::Unknown, CamDist::VeryFarAway, CamDist::InDistance] {
            let json = serde_json::to_value(dist).unwrap();
            assert_eq!(json, dist.as_str());
        }
        assert_eq!(serde_json::to_value(MoveStatus::NotMoved).unwrap(), "notMoved");
        assert_eq!(serde_json::to_value(AddRemoveStatus::NotRemoved).unwrap(), "notRemoved");
        assert_eq!(serde_json::to_value(LocStatus::NotFound).unwrap(), "notFound");
    }

    #[test]
    fn test_parse_from_wire() {
        let pos: CamPos = serde_json::from_str("\"upper right\"").unwrap();
        assert_eq!(pos, CamPos::UpperRight);
        let dist: CamDist = serde_json::from_str("\"\"").unwrap();
        assert_eq!(dist, CamDist::Unknown);
    }
}

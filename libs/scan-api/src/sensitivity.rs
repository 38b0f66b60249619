use serde::{Deserialize, Serialize};

/// How seriously a match should be taken. Carried by rules and by match
/// fragments; a compound rule's explicit `sensitivity` overrides its
/// children's when reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Notification,
    Warning,
    Problem,
    Critical,
}

impl Sensitivity {
    pub fn make_from_dict(obj: &serde_json::Value) -> Option<Self> {
        obj.get("sensitivity").and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

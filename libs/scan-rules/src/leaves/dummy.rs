//! Rules with no real detection logic, used for wiring tests, demos, and
//! failure-path coverage — mirrors `dummy.py`'s three test doubles exactly.

use scan_api::{ConversionValue, CoreError, MatchFragment, OutputType, Sensitivity, SimpleRule};
use serde_json::{json, Value};

/// Matches everything handed to it, unconditionally.
#[derive(Debug, Clone, Default)]
pub struct AlwaysMatchesRule {
    pub sensitivity: Option<Sensitivity>,
    pub name: Option<String>,
}

impl SimpleRule for AlwaysMatchesRule {
    fn operates_on(&self) -> OutputType {
        OutputType::AlwaysTrue
    }

    fn type_label(&self) -> &'static str {
        "fallback"
    }

    fn match_content(&self, _content: &ConversionValue) -> Result<Vec<MatchFragment>, CoreError> {
        Ok(vec![MatchFragment { matched: String::new(), probability: None, sensitivity: self.sensitivity, offset: None, context: None }])
    }

    fn sensitivity(&self) -> Option<Sensitivity> {
        self.sensitivity
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn presentation_raw(&self) -> String {
        "always matches".to_string()
    }

    fn to_json_object(&self) -> Value {
        json!({"type": "fallback"})
    }
}

impl AlwaysMatchesRule {
    pub fn from_json(obj: &Value) -> Option<Self> {
        (obj.get("type")?.as_str()? == "fallback").then(|| Self {
            sensitivity: Sensitivity::make_from_dict(obj),
            name: obj.get("name").and_then(Value::as_str).map(str::to_string),
        })
    }
}

/// Never matches anything — the structural complement of `AlwaysMatchesRule`.
#[derive(Debug, Clone, Default)]
pub struct NeverMatchesRule {
    pub sensitivity: Option<Sensitivity>,
    pub name: Option<String>,
}

impl SimpleRule for NeverMatchesRule {
    fn operates_on(&self) -> OutputType {
        OutputType::NoConversions
    }

    fn type_label(&self) -> &'static str {
        "dummy"
    }

    fn match_content(&self, _content: &ConversionValue) -> Result<Vec<MatchFragment>, CoreError> {
        Ok(vec![])
    }

    fn sensitivity(&self) -> Option<Sensitivity> {
        self.sensitivity
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn presentation_raw(&self) -> String {
        "never matches".to_string()
    }

    fn to_json_object(&self) -> Value {
        json!({"type": "dummy"})
    }
}

impl NeverMatchesRule {
    pub fn from_json(obj: &Value) -> Option<Self> {
        (obj.get("type")?.as_str()? == "dummy").then(|| Self {
            sensitivity: Sensitivity::make_from_dict(obj),
            name: obj.get("name").and_then(Value::as_str).map(str::to_string),
        })
    }
}

/// Always raises a `RuleBug`. Exists purely to exercise the failure path a
/// broken third-party rule would take — never wired into a real ruleset.
#[derive(Debug, Clone, Default)]
pub struct BuggyRule;

impl SimpleRule for BuggyRule {
    fn operates_on(&self) -> OutputType {
        OutputType::NoConversions
    }

    fn type_label(&self) -> &'static str {
        "buggy"
    }

    fn match_content(&self, _content: &ConversionValue) -> Result<Vec<MatchFragment>, CoreError> {
        Err(CoreError::rule_bug("BuggyRule always fails"))
    }

    fn to_json_object(&self) -> Value {
        json!({"type": "buggy"})
    }
}

impl BuggyRule {
    pub fn from_json(obj: &Value) -> Option<Self> {
        (obj.get("type")?.as_str()? == "buggy").then_some(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_matches_rule_matches() {
        let fragments = AlwaysMatchesRule::default().match_content(&ConversionValue::AlwaysTrue).unwrap();
        assert_eq!(fragments.len(), 1);
    }

    #[test]
    fn never_matches_rule_never_matches() {
        let fragments = NeverMatchesRule::default().match_content(&ConversionValue::NoConversions).unwrap();
        assert!(fragments.is_empty());
    }

    #[test]
    fn buggy_rule_always_errors() {
        let err = BuggyRule.match_content(&ConversionValue::NoConversions).unwrap_err();
        assert_eq!(err.kind, scan_api::ErrorKind::RuleBug);
    }
}

//! Type-label registry for leaf rules (§9 "treat registries as build-time
//! lookup tables"): turns the `"type"` discriminator a [`Rule`] JSON object
//! carries back into a concrete [`SimpleRule`]. Plugged into
//! `scan_api::Rule::from_json_object` as the `leaf_decoder` callback, since
//! `scan-api` itself doesn't know about any concrete leaf kind (§4.E: new
//! leaf kinds are exactly the kind of thing a deployment adds without
//! touching the core crate).

use std::sync::Arc;

use scan_api::{CoreError, SimpleRule};
use serde_json::Value;

use crate::leaves::cpr::CprRule;
use crate::leaves::dimensions::DimensionsRule;
use crate::leaves::dummy::{AlwaysMatchesRule, BuggyRule, NeverMatchesRule};
use crate::leaves::last_modified::LastModifiedRule;
use crate::leaves::regex_rule::RegexRule;

/// Decodes one leaf rule from its JSON object form. Returns a `Malformed`
/// `CoreError` for an unrecognised `"type"` label or a structurally invalid
/// object of a recognised one.
pub fn decode_leaf(obj: &Value) -> Result<Arc<dyn SimpleRule>, CoreError> {
    let label = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::malformed("leaf rule missing \"type\""))?;

    match label {
        "regex" => match RegexRule::from_json(obj) {
            Some(Ok(rule)) => Ok(Arc::new(rule)),
            Some(Err(e)) => Err(e),
            None => Err(CoreError::malformed("malformed regex rule")),
        },
        "cpr" => CprRule::from_json(obj)
            .map(|r| Arc::new(r) as Arc<dyn SimpleRule>)
            .ok_or_else(|| CoreError::malformed("malformed cpr rule")),
        "last-modified" => LastModifiedRule::from_json(obj)
            .map(|r| Arc::new(r) as Arc<dyn SimpleRule>)
            .ok_or_else(|| CoreError::malformed("malformed last-modified rule")),
        "dimensions" => DimensionsRule::from_json(obj)
            .map(|r| Arc::new(r) as Arc<dyn SimpleRule>)
            .ok_or_else(|| CoreError::malformed("malformed dimensions rule")),
        "fallback" => AlwaysMatchesRule::from_json(obj)
            .map(|r| Arc::new(r) as Arc<dyn SimpleRule>)
            .ok_or_else(|| CoreError::malformed("malformed fallback rule")),
        "dummy" => NeverMatchesRule::from_json(obj)
            .map(|r| Arc::new(r) as Arc<dyn SimpleRule>)
            .ok_or_else(|| CoreError::malformed("malformed dummy rule")),
        "buggy" => BuggyRule::from_json(obj)
            .map(|r| Arc::new(r) as Arc<dyn SimpleRule>)
            .ok_or_else(|| CoreError::malformed("malformed buggy rule")),
        other => Err(CoreError::malformed(format!("unknown rule type: {other}"))),
    }
}

/// Decodes a full [`scan_api::Rule`] tree (leaves plus `And`/`Or`/`Not`)
/// using [`decode_leaf`] for every leaf it encounters.
pub fn rule_from_json(obj: &Value) -> Result<scan_api::Rule, CoreError> {
    scan_api::Rule::from_json_object(obj, &decode_leaf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_api::Rule;
    use std::sync::Arc as StdArc;

    #[test]
    fn regex_rule_round_trips() {
        let rule = Rule::Leaf(StdArc::new(RegexRule::new("hunter2").unwrap()));
        let json = rule.to_json_object();
        let round = rule_from_json(&json).unwrap();
        assert_eq!(round.operates_on(), scan_api::OutputType::Text);
    }

    #[test]
    fn and_of_regex_and_cpr_round_trips() {
        let rule = Rule::And(
            vec![
                Rule::Leaf(StdArc::new(RegexRule::new("secret").unwrap())),
                Rule::Leaf(StdArc::new(CprRule::default())),
            ],
            Default::default(),
        );
        let json = rule.to_json_object();
        let round = rule_from_json(&json).unwrap();
        assert_eq!(round.size(), rule.size());
    }

    #[test]
    fn unknown_leaf_type_is_malformed() {
        let err = decode_leaf(&serde_json::json!({"type": "not-a-real-rule"})).unwrap_err();
        assert_eq!(err.kind, scan_api::ErrorKind::Malformed);
    }
}

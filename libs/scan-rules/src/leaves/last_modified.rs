use chrono::{DateTime, Utc};
use scan_api::{ConversionValue, CoreError, MatchFragment, OutputType, Sensitivity, SimpleRule};
use serde_json::{json, Value};

/// Matches iff a resource's last-modified timestamp is newer than
/// `threshold` (§4.F) — used to flag content touched since a given cutoff.
#[derive(Debug, Clone)]
pub struct LastModifiedRule {
    pub threshold: DateTime<Utc>,
    pub sensitivity: Option<Sensitivity>,
    pub name: Option<String>,
}

impl LastModifiedRule {
    pub fn new(threshold: DateTime<Utc>) -> Self {
        Self { threshold, sensitivity: None, name: None }
    }
}

impl SimpleRule for LastModifiedRule {
    fn operates_on(&self) -> OutputType {
        OutputType::LastModified
    }

    fn type_label(&self) -> &'static str {
        "last-modified"
    }

    fn match_content(&self, content: &ConversionValue) -> Result<Vec<MatchFragment>, CoreError> {
        let ConversionValue::LastModified(ts) = content else {
            return Err(CoreError::rule_bug("LastModifiedRule requires LastModified content"));
        };
        if *ts > self.threshold {
            Ok(vec![MatchFragment {
                matched: ts.to_rfc3339(),
                probability: None,
                sensitivity: self.sensitivity,
                offset: None,
                context: None,
            }])
        } else {
            Ok(vec![])
        }
    }

    fn sensitivity(&self) -> Option<Sensitivity> {
        self.sensitivity
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn presentation_raw(&self) -> String {
        format!("last modified after {}", self.threshold.to_rfc3339())
    }

    fn to_json_object(&self) -> Value {
        json!({"type": "last-modified", "threshold": self.threshold.to_rfc3339()})
    }
}

impl LastModifiedRule {
    pub fn from_json(obj: &Value) -> Option<Self> {
        if obj.get("type")?.as_str()? != "last-modified" {
            return None;
        }
        let threshold = obj.get("threshold")?.as_str()?;
        let threshold = DateTime::parse_from_rfc3339(threshold).ok()?.with_timezone(&Utc);
        Some(Self {
            threshold,
            sensitivity: Sensitivity::make_from_dict(obj),
            name: obj.get("name").and_then(Value::as_str).map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn newer_than_threshold_matches() {
        let threshold = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let rule = LastModifiedRule::new(threshold);
        let newer = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let fragments = rule.match_content(&ConversionValue::LastModified(newer)).unwrap();
        assert_eq!(fragments.len(), 1);
    }

    #[test]
    fn older_than_threshold_does_not_match() {
        let threshold = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let rule = LastModifiedRule::new(threshold);
        let old = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        let fragments = rule.match_content(&ConversionValue::LastModified(old)).unwrap();
        assert!(fragments.is_empty());
    }
}

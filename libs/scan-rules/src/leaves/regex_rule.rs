use regex::Regex;
use scan_api::{ConversionValue, CoreError, MatchFragment, OutputType, Sensitivity, SimpleRule};
use serde_json::{json, Value};

/// A user-supplied regular expression matched against `Text` content, one
/// `MatchFragment` per non-overlapping hit, with a snippet of surrounding
/// text as context.
#[derive(Debug, Clone)]
pub struct RegexRule {
    pub pattern: String,
    regex: Regex,
    pub context_chars: usize,
    pub sensitivity: Option<Sensitivity>,
    pub name: Option<String>,
}

impl RegexRule {
    pub fn new(pattern: impl Into<String>) -> Result<Self, CoreError> {
        let pattern = pattern.into();
        let regex = Regex::new(&pattern)
            .map_err(|e| CoreError::rule_bug(format!("invalid regex {pattern:?}: {e}")))?;
        Ok(Self { pattern, regex, context_chars: 20, sensitivity: None, name: None })
    }
}

/// Widens `[start, end)` outward to the nearest char boundaries before
/// slicing — `start`/`end` come from byte offsets around a match and may
/// land inside a multi-byte UTF-8 sequence (e.g. Danish `æøå`).
fn char_boundary_slice(text: &str, mut start: usize, mut end: usize) -> &str {
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}

impl SimpleRule for RegexRule {
    fn operates_on(&self) -> OutputType {
        OutputType::Text
    }

    fn type_label(&self) -> &'static str {
        "regex"
    }

    fn match_content(&self, content: &ConversionValue) -> Result<Vec<MatchFragment>, CoreError> {
        let ConversionValue::Text(text) = content else {
            return Err(CoreError::rule_bug("RegexRule requires Text content"));
        };
        let fragments = self
            .regex
            .find_iter(text)
            .map(|m| {
                let start = m.start().saturating_sub(self.context_chars);
                let end = (m.end() + self.context_chars).min(text.len());
                MatchFragment {
                    matched: m.as_str().to_string(),
                    probability: None,
                    sensitivity: self.sensitivity,
                    offset: Some(m.start()),
                    context: Some(char_boundary_slice(text, start, end).to_string()),
                }
            })
            .collect();
        Ok(fragments)
    }

    fn sensitivity(&self) -> Option<Sensitivity> {
        self.sensitivity
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn presentation_raw(&self) -> String {
        format!("text matching /{}/", self.pattern)
    }

    fn to_json_object(&self) -> Value {
        json!({"type": "regex", "pattern": self.pattern})
    }
}

impl RegexRule {
    pub fn from_json(obj: &Value) -> Option<Result<Self, CoreError>> {
        if obj.get("type")?.as_str()? != "regex" {
            return None;
        }
        let pattern = obj.get("pattern")?.as_str()?.to_string();
        let mut rule = match RegexRule::new(pattern) {
            Ok(r) => r,
            Err(e) => return Some(Err(e)),
        };
        rule.sensitivity = Sensitivity::make_from_dict(obj);
        rule.name = obj.get("name").and_then(Value::as_str).map(str::to_string);
        Some(Ok(rule))
    }
}

use scan_api::{ConversionValue, CoreError, MatchFragment, OutputType, Sensitivity, SimpleRule};
use serde_json::{json, Value};

/// Matches iff an image meets a minimum width, height, or area threshold —
/// used to flag large images (e.g. scanned documents) among smaller
/// incidental ones (icons, spacer gifs).
#[derive(Debug, Clone, Default)]
pub struct DimensionsRule {
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    pub min_width_times_height: Option<u64>,
    pub sensitivity: Option<Sensitivity>,
    pub name: Option<String>,
}

impl SimpleRule for DimensionsRule {
    fn operates_on(&self) -> OutputType {
        OutputType::ImageDimensions
    }

    fn type_label(&self) -> &'static str {
        "dimensions"
    }

    fn match_content(&self, content: &ConversionValue) -> Result<Vec<MatchFragment>, CoreError> {
        let ConversionValue::ImageDimensions { width, height } = content else {
            return Err(CoreError::rule_bug("DimensionsRule requires ImageDimensions content"));
        };
        let (width, height) = (*width, *height);
        let meets = self.min_width.map_or(true, |m| width >= m)
            && self.min_height.map_or(true, |m| height >= m)
            && self
                .min_width_times_height
                .map_or(true, |m| (width as u64) * (height as u64) >= m);
        if meets {
            Ok(vec![MatchFragment {
                matched: format!("{width}x{height}"),
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

    fn to_json_object(&self) -> Value {
        json!({
            "type": "dimensions",
            "min_width": self.min_width,
            "min_height": self.min_height,
            "min_width_times_height": self.min_width_times_height,
        })
    }
}

impl DimensionsRule {
    pub fn from_json(obj: &Value) -> Option<Self> {
        if obj.get("type")?.as_str()? != "dimensions" {
            return None;
        }
        Some(Self {
            min_width: obj.get("min_width").and_then(Value::as_u64).map(|v| v as u32),
            min_height: obj.get("min_height").and_then(Value::as_u64).map(|v| v as u32),
            min_width_times_height: obj.get("min_width_times_height").and_then(Value::as_u64),
            sensitivity: Sensitivity::make_from_dict(obj),
            name: obj.get("name").and_then(Value::as_str).map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_images_below_minimum_width() {
        let rule = DimensionsRule { min_width: Some(1000), ..Default::default() };
        let fragments = rule
            .match_content(&ConversionValue::ImageDimensions { width: 16, height: 16 })
            .unwrap();
        assert!(fragments.is_empty());
    }

    #[test]
    fn accepts_images_meeting_area_threshold() {
        let rule = DimensionsRule { min_width_times_height: Some(1_000_000), ..Default::default() };
        let fragments = rule
            .match_content(&ConversionValue::ImageDimensions { width: 2000, height: 1000 })
            .unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].matched, "2000x1000");
    }
}

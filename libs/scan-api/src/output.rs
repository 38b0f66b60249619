use serde::{Deserialize, Serialize};

/// The closed set of representation kinds a `Resource` can be converted to.
/// Conversions are registered as `(OutputType, mime-pattern) -> fn(Resource) -> value`
/// (see `scan-conversions`); rules declare which one they operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    Text,
    Links,
    ImageDimensions,
    LastModified,
    Mrz,
    AlwaysTrue,
    NoConversions,
}

impl OutputType {
    pub fn label(&self) -> &'static str {
        match self {
            OutputType::Text => "text",
            OutputType::Links => "links",
            OutputType::ImageDimensions => "image-dimensions",
            OutputType::LastModified => "last-modified",
            OutputType::Mrz => "mrz",
            OutputType::AlwaysTrue => "always-true",
            OutputType::NoConversions => "no-conversions",
        }
    }
}

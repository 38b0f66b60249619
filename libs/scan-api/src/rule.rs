use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::output::OutputType;
use crate::sensitivity::Sensitivity;

/// One hit produced by a simple rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFragment {
    #[serde(rename = "match")]
    pub matched: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<Sensitivity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl MatchFragment {
    pub fn new(matched: impl Into<String>) -> Self {
        Self { matched: matched.into(), probability: None, sensitivity: None, offset: None, context: None }
    }
}

/// The value handed to a leaf rule's `match_content`: whatever
/// `scan-conversions` produced for the `OutputType` the rule declared it
/// operates on. Closed over the `OutputType` set (§3).
#[derive(Debug, Clone)]
pub enum ConversionValue {
    Text(String),
    Links(Vec<String>),
    ImageDimensions { width: u32, height: u32 },
    LastModified(chrono::DateTime<chrono::Utc>),
    Mrz(String),
    AlwaysTrue,
    NoConversions,
}

/// A leaf rule: declares the `OutputType` it operates on and how to turn a
/// conversion value into zero or more match fragments. Implemented as a
/// trait object (not an enum variant) because, unlike `Source`/`Handle`, new
/// leaf kinds are exactly the kind of thing a deployment adds without
/// touching this crate — the same reasoning `gauss-api` applies to
/// `FormatSerializer`.
pub trait SimpleRule: fmt::Debug + Send + Sync {
    fn operates_on(&self) -> OutputType;

    fn type_label(&self) -> &'static str;

    fn match_content(&self, content: &ConversionValue) -> Result<Vec<MatchFragment>, CoreError>;

    fn sensitivity(&self) -> Option<Sensitivity> {
        None
    }

    fn name(&self) -> Option<&str> {
        None
    }

    /// Short, human-readable description of what this rule always/never
    /// does, for presentation purposes (mirrors `presentation_raw` on the
    /// dummy rules in the original).
    fn presentation_raw(&self) -> String {
        format!("rule of type {}", self.type_label())
    }

    fn to_json_object(&self) -> Value;
}

#[derive(Debug, Clone, Default)]
pub struct RuleMeta {
    pub sensitivity: Option<Sensitivity>,
    pub name: Option<String>,
}

/// The rule algebra: leaves (`SimpleRule`s) combined with `And`/`Or`/`Not`.
/// Immutable; `split()` returns fresh subtrees (§3 invariant), never mutates
/// `self`.
#[derive(Clone)]
pub enum Rule {
    Leaf(Arc<dyn SimpleRule>),
    And(Vec<Rule>, RuleMeta),
    Or(Vec<Rule>, RuleMeta),
    Not(Box<Rule>, RuleMeta),
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Leaf(r) => write!(f, "Leaf({})", r.type_label()),
            Rule::And(children, _) => f.debug_tuple("And").field(children).finish(),
            Rule::Or(children, _) => f.debug_tuple("Or").field(children).finish(),
            Rule::Not(child, _) => f.debug_tuple("Not").field(child).finish(),
        }
    }
}

/// What's left to evaluate once a leaf has peeled off: either another rule
/// to keep evaluating, or a final boolean verdict.
#[derive(Debug, Clone)]
pub enum Residue {
    Rule(Rule),
    Bool(bool),
}

impl Residue {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Residue::Bool(_))
    }
}

impl Rule {
    pub fn operates_on(&self) -> OutputType {
        match self {
            Rule::Leaf(r) => r.operates_on(),
            // Compound rules derive it as the union of children's (§4.E);
            // since evaluation always starts from `split().head`, which is
            // always a leaf, the "union" only matters for introspection —
            // we report the first child's, which is what `split()` would
            // pick next.
            Rule::And(children, _) | Rule::Or(children, _) => {
                children.first().map(Rule::operates_on).unwrap_or(OutputType::NoConversions)
            }
            Rule::Not(child, _) => child.operates_on(),
        }
    }

    pub fn sensitivity(&self) -> Option<Sensitivity> {
        match self {
            Rule::Leaf(r) => r.sensitivity(),
            Rule::And(_, m) | Rule::Or(_, m) | Rule::Not(_, m) => m.sensitivity,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Rule::Leaf(r) => r.name(),
            Rule::And(_, m) | Rule::Or(_, m) | Rule::Not(_, m) => m.name.as_deref(),
        }
    }

    /// Size of the tree, used by testable property 4 to bound the number of
    /// `split()` steps a full evaluation can take.
    pub fn size(&self) -> usize {
        match self {
            Rule::Leaf(_) => 1,
            Rule::And(children, _) | Rule::Or(children, _) => {
                1 + children.iter().map(Rule::size).sum::<usize>()
            }
            Rule::Not(child, _) => 1 + child.size(),
        }
    }

    /// Returns the next simple rule to evaluate and the two residues to use
    /// on match and non-match respectively (§4.E, implementation hint §9).
    pub fn split(&self) -> (Arc<dyn SimpleRule>, Residue, Residue) {
        match self {
            Rule::Leaf(r) => (r.clone(), Residue::Bool(true), Residue::Bool(false)),

            Rule::And(children, meta) => {
                let (first, rest) = children.split_first().expect("And has at least one child");
                let (head, pve, nve) = first.split();
                let pve = graft_and(pve, rest, meta);
                // non-match short-circuits the whole conjunction to false
                let nve = match nve {
                    Residue::Bool(false) => Residue::Bool(false),
                    other => graft_and(other, rest, meta),
                };
                (head, pve, nve)
            }

            Rule::Or(children, meta) => {
                let (first, rest) = children.split_first().expect("Or has at least one child");
                let (head, pve, nve) = first.split();
                let pve = match pve {
                    Residue::Bool(true) => Residue::Bool(true),
                    other => graft_or(other, rest, meta),
                };
                let nve = graft_or(nve, rest, meta);
                (head, pve, nve)
            }

            Rule::Not(child, _) => {
                let (head, pve, nve) = child.split();
                (head, negate(nve), negate(pve))
            }
        }
    }

    pub fn to_json_object(&self) -> Value {
        match self {
            Rule::Leaf(r) => r.to_json_object(),
            Rule::And(children, meta) => compound_json("and", children, meta),
            Rule::Or(children, meta) => compound_json("or", children, meta),
            Rule::Not(child, meta) => {
                let mut obj = serde_json::Map::new();
                obj.insert("type".into(), Value::String("not".into()));
                obj.insert("component".into(), child.to_json_object());
                meta_into(&mut obj, meta);
                Value::Object(obj)
            }
        }
    }

    /// Round-trips a `Rule` tree from its `to_json_object()` form (§3, §8
    /// testable property 2). `And`/`Or`/`Not` are decoded here since they're
    /// part of this crate; leaf kinds are a deployment-open set (§9), so
    /// decoding one is delegated to `leaf_decoder` — concretely,
    /// `scan-rules`'s type-label registry.
    pub fn from_json_object(
        obj: &Value,
        leaf_decoder: &dyn Fn(&Value) -> Result<Arc<dyn SimpleRule>, CoreError>,
    ) -> Result<Rule, CoreError> {
        let ty = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::malformed("rule json object missing \"type\""))?;
        match ty {
            "and" | "or" => {
                let components = obj
                    .get("components")
                    .and_then(Value::as_array)
                    .ok_or_else(|| CoreError::malformed(format!("{ty} rule missing \"components\"")))?;
                let children = components
                    .iter()
                    .map(|c| Rule::from_json_object(c, leaf_decoder))
                    .collect::<Result<Vec<_>, _>>()?;
                let meta = meta_from(obj);
                Ok(if ty == "and" { Rule::And(children, meta) } else { Rule::Or(children, meta) })
            }
            "not" => {
                let component = obj
                    .get("component")
                    .ok_or_else(|| CoreError::malformed("not rule missing \"component\""))?;
                let child = Rule::from_json_object(component, leaf_decoder)?;
                Ok(Rule::Not(Box::new(child), meta_from(obj)))
            }
            _ => Ok(Rule::Leaf(leaf_decoder(obj)?)),
        }
    }
}

fn meta_from(obj: &Value) -> RuleMeta {
    RuleMeta {
        sensitivity: obj.get("sensitivity").and_then(|v| serde_json::from_value(v.clone()).ok()),
        name: obj.get("name").and_then(Value::as_str).map(str::to_string),
    }
}

fn negate(r: Residue) -> Residue {
    match r {
        Residue::Bool(b) => Residue::Bool(!b),
        Residue::Rule(rule) => Residue::Rule(Rule::Not(Box::new(rule), RuleMeta::default())),
    }
}

fn graft_and(residue: Residue, rest: &[Rule], meta: &RuleMeta) -> Residue {
    if rest.is_empty() {
        return residue;
    }
    match residue {
        Residue::Bool(false) => Residue::Bool(false),
        Residue::Bool(true) => Residue::Rule(Rule::And(rest.to_vec(), meta.clone())),
        Residue::Rule(r) => {
            let mut children = vec![r];
            children.extend_from_slice(rest);
            Residue::Rule(Rule::And(children, meta.clone()))
        }
    }
}

fn graft_or(residue: Residue, rest: &[Rule], meta: &RuleMeta) -> Residue {
    if rest.is_empty() {
        return residue;
    }
    match residue {
        Residue::Bool(true) => Residue::Bool(true),
        Residue::Bool(false) => Residue::Rule(Rule::Or(rest.to_vec(), meta.clone())),
        Residue::Rule(r) => {
            let mut children = vec![r];
            children.extend_from_slice(rest);
            Residue::Rule(Rule::Or(children, meta.clone()))
        }
    }
}

fn compound_json(label: &str, children: &[Rule], meta: &RuleMeta) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("type".into(), Value::String(label.into()));
    obj.insert(
        "components".into(),
        Value::Array(children.iter().map(Rule::to_json_object).collect()),
    );
    meta_into(&mut obj, meta);
    Value::Object(obj)
}

fn meta_into(obj: &mut serde_json::Map<String, Value>, meta: &RuleMeta) {
    if let Some(s) = meta.sensitivity {
        obj.insert("sensitivity".into(), serde_json::to_value(s).unwrap());
    }
    if let Some(n) = &meta.name {
        obj.insert("name".into(), Value::String(n.clone()));
    }
}

/// Runs the `split()` evaluation loop described in §4.E against a source of
/// conversion values. `fetch` is called once per leaf with the `OutputType`
/// it declared; returning the content for that leaf to be matched against.
pub fn evaluate(
    rule: &Rule,
    mut fetch: impl FnMut(OutputType) -> Result<ConversionValue, CoreError>,
) -> Result<(bool, Vec<MatchFragment>), CoreError> {
    let mut residue = Residue::Rule(rule.clone());
    let mut fragments = Vec::new();
    let max_steps = rule.size() + 1;
    for _ in 0..max_steps {
        let r = match residue {
            Residue::Bool(b) => return Ok((b, fragments)),
            Residue::Rule(r) => r,
        };
        let (head, pve, nve) = r.split();
        let content = fetch(head.operates_on())?;
        let matches = head.match_content(&content)?;
        let matched = !matches.is_empty();
        fragments.extend(matches);
        residue = if matched { pve } else { nve };
    }
    match residue {
        Residue::Bool(b) => Ok((b, fragments)),
        Residue::Rule(_) => Err(CoreError::fatal("rule evaluation did not terminate within tree size bound")),
    }
}

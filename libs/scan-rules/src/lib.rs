//! Concrete leaf rules (component F, §4.F): the built-in `SimpleRule`
//! implementations a deployment wires into a `Rule` tree.

pub mod leaves;
pub mod registry;

pub use leaves::cpr::{CprPolicy, CprRule};
pub use leaves::dimensions::DimensionsRule;
pub use leaves::dummy::{AlwaysMatchesRule, BuggyRule, NeverMatchesRule};
pub use leaves::last_modified::LastModifiedRule;
pub use leaves::regex_rule::RegexRule;
pub use registry::{decode_leaf, rule_from_json};

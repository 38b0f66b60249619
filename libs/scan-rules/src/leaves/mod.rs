pub mod cpr;
pub mod dimensions;
pub mod dummy;
pub mod last_modified;
pub mod regex_rule;

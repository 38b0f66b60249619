pub mod error;
pub mod manager;
pub mod output;
pub mod resource;
pub mod rule;
pub mod sensitivity;
pub mod source;

pub use error::{CoreError, DeserialisationError, ErrorKind, UnknownSchemeError};
pub use manager::{Cookie, HandleSource, Manager};
pub use output::OutputType;
pub use resource::{Resource, ScopedPath};
pub use rule::{evaluate, ConversionValue, MatchFragment, Residue, Rule, RuleMeta, SimpleRule};
pub use sensitivity::Sensitivity;
pub use source::{DataSource, DerivedSource, FileSource, Handle, HttpSource, MailSource, SmbSource, Source};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug)]
    struct AlwaysTrue;
    impl SimpleRule for AlwaysTrue {
        fn operates_on(&self) -> OutputType {
            OutputType::AlwaysTrue
        }
        fn type_label(&self) -> &'static str {
            "test-always"
        }
        fn match_content(&self, _: &ConversionValue) -> Result<Vec<MatchFragment>, CoreError> {
            Ok(vec![MatchFragment::new("x")])
        }
        fn to_json_object(&self) -> serde_json::Value {
            serde_json::json!({"type": "test-always"})
        }
    }

    #[derive(Debug)]
    struct NeverMatches;
    impl SimpleRule for NeverMatches {
        fn operates_on(&self) -> OutputType {
            OutputType::NoConversions
        }
        fn type_label(&self) -> &'static str {
            "test-never"
        }
        fn match_content(&self, _: &ConversionValue) -> Result<Vec<MatchFragment>, CoreError> {
            Ok(vec![])
        }
        fn to_json_object(&self) -> serde_json::Value {
            serde_json::json!({"type": "test-never"})
        }
    }

    #[test]
    fn and_short_circuits_on_first_failure() {
        let rule = Rule::And(
            vec![Rule::Leaf(Arc::new(NeverMatches)), Rule::Leaf(Arc::new(AlwaysTrue))],
            RuleMeta::default(),
        );
        let mut calls = 0;
        let (result, _) = evaluate(&rule, |_| {
            calls += 1;
            Ok(ConversionValue::NoConversions)
        })
        .unwrap();
        assert!(!result);
        assert_eq!(calls, 1, "second child must not be evaluated once the first fails");
    }

    #[test]
    fn or_short_circuits_on_first_success() {
        let rule = Rule::Or(
            vec![Rule::Leaf(Arc::new(AlwaysTrue)), Rule::Leaf(Arc::new(NeverMatches))],
            RuleMeta::default(),
        );
        let mut calls = 0;
        let (result, _) = evaluate(&rule, |_| {
            calls += 1;
            Ok(ConversionValue::AlwaysTrue)
        })
        .unwrap();
        assert!(result);
        assert_eq!(calls, 1);
    }

    #[test]
    fn not_negates_outcome() {
        let rule = Rule::Not(Box::new(Rule::Leaf(Arc::new(AlwaysTrue))), RuleMeta::default());
        let (result, _) = evaluate(&rule, |_| Ok(ConversionValue::AlwaysTrue)).unwrap();
        assert!(!result);
    }

    #[test]
    fn source_json_round_trips() {
        let s = Source::File(FileSource { path: "/tmp/t1/a.txt".into() });
        let round = Source::from_json_object(&s.to_json_object()).unwrap();
        assert_eq!(s, round);
    }

    #[test]
    fn smb_censor_strips_password() {
        let s = Source::Smb(SmbSource {
            unc_path: "//host/share".into(),
            domain: None,
            user: Some("bob".into()),
            password: Some("hunter2".into()),
            use_smbc_backend: false,
        });
        let censored = s.censor().to_json_object();
        assert!(!censored.to_string().contains("hunter2"));
    }

    #[test]
    fn derived_handle_presentation_joins_parent() {
        let parent = Handle::new(Source::File(FileSource { path: "/tmp/t2/a.zip".into() }), "a.zip");
        let derived = Source::Derived(DerivedSource::Zip { parent: Box::new(parent) });
        let handle = Handle::new(derived, "b.txt");
        assert_eq!(handle.presentation(), "a.zip/b.txt");
    }
}

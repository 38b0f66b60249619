//! The Matcher (§4.E, §4.H): runs one `split()` step against a conversion
//! the Processor computed, then either settles the outcome for this handle
//! or loops back for the next conversion the residue needs.

use scan_api::{CoreError, Residue};
use scan_messages::{
    ConversionReady, ConversionRequest, MatchMessage, MatchOutcome, MetadataRequest, Problem, Progress,
};

use crate::bus::ScanBus;

pub async fn run(bus: ScanBus) {
    loop {
        let Some(ready) = bus.pending_matches.recv().await else { break };
        match_one(&bus, ready).await;
    }
}

async fn match_one(bus: &ScanBus, ready: ConversionReady) {
    let rule = match scan_rules::rule_from_json(&ready.progress.rule) {
        Ok(r) => r,
        Err(e) => {
            report_problem(bus, &ready, &e).await;
            return;
        }
    };

    let (head, pve, nve) = rule.split();
    let value: scan_api::ConversionValue = ready.value.clone().into();
    let matched = match head.match_content(&value) {
        Ok(fragments) => fragments,
        Err(e) => {
            report_problem(bus, &ready, &e).await;
            return;
        }
    };

    let mut fragments: Vec<serde_json::Value> = ready
        .progress
        .matches
        .iter()
        .cloned()
        .chain(matched.iter().map(|f| serde_json::to_value(f).expect("MatchFragment serialises")))
        .collect();

    let residue = if matched.is_empty() { nve } else { pve };

    match residue {
        Residue::Bool(outcome) => {
            if matched.is_empty() {
                fragments.clear();
            }
            let terminal = MatchMessage {
                scan_tag: ready.scan_tag.clone(),
                handle: ready.handle.clone(),
                outcome: if outcome {
                    MatchOutcome::Positive { fragments: fragments.clone() }
                } else {
                    MatchOutcome::Negative { fragments }
                },
            };
            let is_positive = terminal.is_positive();
            let _ = bus.matches.publish(terminal).await;
            if is_positive {
                let _ = bus
                    .metadata_requests
                    .publish(MetadataRequest { scan_tag: ready.scan_tag, handle: ready.handle })
                    .await;
            }
        }
        Residue::Rule(next_rule) => {
            let continue_msg = MatchMessage {
                scan_tag: ready.scan_tag.clone(),
                handle: ready.handle.clone(),
                outcome: MatchOutcome::Continue { residue: next_rule.to_json_object(), fragments: fragments.clone() },
            };
            let _ = bus.matches.publish(continue_msg).await;

            let request = ConversionRequest {
                scan_tag: ready.scan_tag,
                source: ready.source,
                handle: ready.handle,
                rule: next_rule.to_json_object(),
                configuration: ready.configuration,
                progress: Progress { rule: next_rule.to_json_object(), matches: fragments },
            };
            let _ = bus.conversions.publish(request).await;
        }
    }
}

async fn report_problem(bus: &ScanBus, ready: &ConversionReady, error: &CoreError) {
    let problem = Problem::from_error(
        Some(ready.scan_tag.clone()),
        ready.handle.censor().to_json_object(),
        error,
    );
    let _ = bus.problems.publish(problem).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_api::{FileSource, Handle, RuleMeta, Source};
    use scan_messages::{ConversionValueWire, ScanTag, Scanner};
    use std::sync::Arc;

    fn tag() -> ScanTag {
        ScanTag { scanner: Scanner { pk: 1, name: "t".into() }, time: chrono::Utc::now(), user: None, organisation: None }
    }

    fn ready_for(rule: &scan_api::Rule, value: ConversionValueWire) -> ConversionReady {
        let source = Source::File(FileSource { path: "/tmp".into() });
        let handle = Handle::new(source.clone(), "a.txt");
        ConversionReady {
            scan_tag: tag(),
            source,
            handle,
            progress: Progress { rule: rule.to_json_object(), matches: vec![] },
            configuration: serde_json::Value::Null,
            value,
        }
    }

    #[tokio::test]
    async fn single_leaf_match_is_a_terminal_positive() {
        let bus = ScanBus::new(8);
        let leaf = scan_rules::RegexRule::new("Vores").unwrap();
        let rule = scan_api::Rule::Leaf(Arc::new(leaf));
        let ready = ready_for(&rule, ConversionValueWire::Text { text: "Vores hemmelige".into() });

        match_one(&bus, ready).await;

        let msg = bus.matches.recv().await.unwrap();
        assert!(msg.is_terminal());
        assert!(msg.is_positive());
        let meta_req = bus.metadata_requests.recv().await;
        assert!(meta_req.is_some());
    }

    #[tokio::test]
    async fn and_of_two_leaves_requests_the_second_conversion_on_first_match() {
        let bus = ScanBus::new(8);
        let first = scan_rules::RegexRule::new("Vores").unwrap();
        let second = scan_rules::AlwaysMatchesRule::default();
        let rule = scan_api::Rule::And(
            vec![scan_api::Rule::Leaf(Arc::new(first)), scan_api::Rule::Leaf(Arc::new(second))],
            RuleMeta::default(),
        );
        let ready = ready_for(&rule, ConversionValueWire::Text { text: "Vores hemmelige".into() });

        match_one(&bus, ready).await;

        let continue_msg = bus.matches.recv().await.unwrap();
        assert!(!continue_msg.is_terminal());

        let next_request = bus.conversions.recv().await.unwrap();
        assert_eq!(next_request.progress.matches.len(), 1);
    }

    #[tokio::test]
    async fn no_match_is_a_terminal_negative_with_no_metadata_request() {
        let bus = ScanBus::new(8);
        let leaf = scan_rules::RegexRule::new("does-not-appear").unwrap();
        let rule = scan_api::Rule::Leaf(Arc::new(leaf));
        let ready = ready_for(&rule, ConversionValueWire::Text { text: "nothing here".into() });

        match_one(&bus, ready).await;

        let msg = bus.matches.recv().await.unwrap();
        assert!(msg.is_terminal());
        assert!(!msg.is_positive());

        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(50), bus.metadata_requests.recv())
            .await
            .is_err();
        assert!(timed_out, "no metadata request should be published for a negative match");
    }
}

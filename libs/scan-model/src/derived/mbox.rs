use scan_api::{CoreError, DerivedSource, Handle, Resource, Source};

use crate::manager::{follow as follow_resource, SourceManager};
use crate::resource::TextResourceImpl;

/// Splits a raw mbox file into individual message bodies on the classic
/// `From ` line delimiter (a line starting with `From ` at column 0,
/// followed by an envelope sender and date).
fn split_messages(text: &str) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if line.starts_with("From ") && !current.is_empty() {
            messages.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        messages.push(current);
    }
    messages
}

fn parent_text(source: &DerivedSource, manager: &mut SourceManager) -> Result<String, CoreError> {
    let DerivedSource::Mbox { parent } = source else { unreachable!() };
    let resource = follow_resource(parent, manager)?;
    let mut stream = resource.make_stream()?;
    let mut text = String::new();
    std::io::Read::read_to_string(&mut stream, &mut text)
        .map_err(|e| CoreError::conversion_failure(format!("mbox is not valid UTF-8 text: {e}")))?;
    Ok(text)
}

pub fn handles(source: &DerivedSource, manager: &mut SourceManager) -> Result<Vec<Handle>, CoreError> {
    let src = Source::Derived(source.clone());
    let text = parent_text(source, manager)?;
    let messages = split_messages(&text);
    Ok((1..=messages.len())
        .map(|i| Handle::new(src.clone(), format!("message-{i:04}")))
        .collect())
}

pub fn follow(handle: &Handle, manager: &mut SourceManager) -> Result<Box<dyn Resource>, CoreError> {
    let Source::Derived(derived @ DerivedSource::Mbox { .. }) = &handle.source else {
        unreachable!()
    };
    let text = parent_text(derived, manager)?;
    let messages = split_messages(&text);
    let index: usize = handle
        .relative_path
        .strip_prefix("message-")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| CoreError::malformed(format!("not an mbox message handle: {}", handle.relative_path)))?;
    let body = messages
        .get(index - 1)
        .ok_or_else(|| CoreError::unavailable(format!("mbox message {index} not found")))?;
    Ok(Box::new(TextResourceImpl {
        handle: handle.clone(),
        mime: "message/rfc822".to_string(),
        text: body.clone(),
    }))
}

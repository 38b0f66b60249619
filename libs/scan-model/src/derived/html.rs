use once_cell::sync::Lazy;
use regex::Regex;
use scan_api::{CoreError, DerivedSource, Handle, HttpSource, Resource, Source};

use crate::manager::{follow as follow_resource, SourceManager};
use crate::resource::TextResourceImpl;

static HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\b(?:href|src)\s*=\s*"([^"]+)""#).unwrap());

fn parent_html(source: &DerivedSource, manager: &mut SourceManager) -> Result<String, CoreError> {
    let DerivedSource::HtmlLinks { parent } = source else { unreachable!() };
    let resource = follow_resource(parent, manager)?;
    let mut stream = resource.make_stream()?;
    let mut text = String::new();
    std::io::Read::read_to_string(&mut stream, &mut text)
        .map_err(|e| CoreError::conversion_failure(format!("page is not valid UTF-8 text: {e}")))?;
    Ok(text)
}

fn extract_links(html: &str) -> Vec<String> {
    HREF.captures_iter(html).map(|c| c[1].to_string()).collect()
}

/// Each discovered link is promoted directly to its own `HttpSource` handle
/// rather than nested as `(HtmlLinks-source, link)` — link expansion widens
/// the scan to new roots, it doesn't name objects within this page, so the
/// handle's source is the linked page itself.
pub fn handles(source: &DerivedSource, manager: &mut SourceManager) -> Result<Vec<Handle>, CoreError> {
    let html = parent_html(source, manager)?;
    Ok(extract_links(&html)
        .into_iter()
        .map(|url| Handle::new(Source::Http(HttpSource { url }), String::new()))
        .collect())
}

pub fn follow(handle: &Handle, manager: &mut SourceManager) -> Result<Box<dyn Resource>, CoreError> {
    // Present the set of links themselves as the page's content, for rules
    // that want to inspect link text directly rather than recurse into it.
    let Source::Derived(derived @ DerivedSource::HtmlLinks { .. }) = &handle.source else {
        unreachable!()
    };
    let html = parent_html(derived, manager)?;
    let links = extract_links(&html).join("\n");
    Ok(Box::new(TextResourceImpl { handle: handle.clone(), mime: "text/plain".to_string(), text: links }))
}

//! `conversion(output_type, mime_pattern)` registrations (§4.D): typed
//! converters from a `Resource` to an `OutputType` value. The processor
//! looks a converter up by `(requested_output_type, resource.compute_type())`;
//! the longest matching MIME prefix wins.

use std::io::Read;

use once_cell::sync::Lazy;
use regex::Regex;
use scan_api::{ConversionValue, CoreError, OutputType, Resource};

type ConverterFn = fn(&dyn Resource) -> Result<ConversionValue, CoreError>;

struct Entry {
    output: OutputType,
    /// Empty string matches every mime type (the lowest-priority fallback).
    mime_prefix: &'static str,
    convert: ConverterFn,
}

static REGISTRY: &[Entry] = &[
    Entry { output: OutputType::Text, mime_prefix: "", convert: convert_text },
    Entry { output: OutputType::Links, mime_prefix: "text/html", convert: convert_links },
    Entry { output: OutputType::ImageDimensions, mime_prefix: "image/png", convert: convert_png_dimensions },
    Entry { output: OutputType::ImageDimensions, mime_prefix: "image/jpeg", convert: convert_jpeg_dimensions },
    Entry { output: OutputType::ImageDimensions, mime_prefix: "image/gif", convert: convert_gif_dimensions },
    Entry { output: OutputType::LastModified, mime_prefix: "", convert: convert_last_modified },
    Entry { output: OutputType::Mrz, mime_prefix: "text/plain", convert: convert_mrz },
    Entry { output: OutputType::AlwaysTrue, mime_prefix: "", convert: |_| Ok(ConversionValue::AlwaysTrue) },
    Entry { output: OutputType::NoConversions, mime_prefix: "", convert: |_| Ok(ConversionValue::NoConversions) },
];

/// Looks up and runs the converter for `output` against `resource`,
/// picking the entry with the longest matching MIME prefix.
pub fn convert(output: OutputType, resource: &dyn Resource) -> Result<ConversionValue, CoreError> {
    // AlwaysTrue/NoConversions never need a resource's real MIME type —
    // some stub backends (§ scan-model StubResourceImpl) only guess one
    // from the file name, which is fine, but don't force the lookup to fail
    // if that guess errors.
    let mime = match output {
        OutputType::AlwaysTrue | OutputType::NoConversions => String::new(),
        _ => resource.compute_type()?,
    };

    let best = REGISTRY
        .iter()
        .filter(|e| e.output == output && mime.starts_with(e.mime_prefix))
        .max_by_key(|e| e.mime_prefix.len());

    match best {
        Some(entry) => (entry.convert)(resource),
        None => Err(CoreError::conversion_failure(format!(
            "no converter registered for ({:?}, {mime})",
            output
        ))),
    }
}

fn read_all(resource: &dyn Resource) -> Result<Vec<u8>, CoreError> {
    let mut stream = resource.make_stream()?;
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn convert_text(resource: &dyn Resource) -> Result<ConversionValue, CoreError> {
    let bytes = read_all(resource)?;
    let text = String::from_utf8(bytes)
        .map_err(|e| CoreError::conversion_failure(format!("not valid UTF-8 text: {e}")))?;
    Ok(ConversionValue::Text(text))
}

static HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\b(?:href|src)\s*=\s*"([^"]+)""#).unwrap());

fn convert_links(resource: &dyn Resource) -> Result<ConversionValue, CoreError> {
    let ConversionValue::Text(text) = convert_text(resource)? else { unreachable!() };
    Ok(ConversionValue::Links(HREF.captures_iter(&text).map(|c| c[1].to_string()).collect()))
}

fn convert_last_modified(resource: &dyn Resource) -> Result<ConversionValue, CoreError> {
    match resource.last_modified()? {
        Some(ts) => Ok(ConversionValue::LastModified(ts)),
        None => Err(CoreError::conversion_failure("resource does not report a last-modified time")),
    }
}

/// PNG: an 8-byte signature followed by an `IHDR` chunk whose first 8 data
/// bytes are width/height as big-endian u32s.
fn convert_png_dimensions(resource: &dyn Resource) -> Result<ConversionValue, CoreError> {
    let bytes = read_all(resource)?;
    if bytes.len() < 24 || &bytes[..8] != b"\x89PNG\r\n\x1a\n" || &bytes[12..16] != b"IHDR" {
        return Err(CoreError::conversion_failure("not a valid PNG header"));
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().unwrap());
    let height = u32::from_be_bytes(bytes[20..24].try_into().unwrap());
    Ok(ConversionValue::ImageDimensions { width, height })
}

/// GIF: a 6-byte signature (`GIF87a`/`GIF89a`) followed by a little-endian
/// u16 width and height in the logical screen descriptor.
fn convert_gif_dimensions(resource: &dyn Resource) -> Result<ConversionValue, CoreError> {
    let bytes = read_all(resource)?;
    if bytes.len() < 10 || (&bytes[..6] != b"GIF87a" && &bytes[..6] != b"GIF89a") {
        return Err(CoreError::conversion_failure("not a valid GIF header"));
    }
    let width = u16::from_le_bytes(bytes[6..8].try_into().unwrap()) as u32;
    let height = u16::from_le_bytes(bytes[8..10].try_into().unwrap()) as u32;
    Ok(ConversionValue::ImageDimensions { width, height })
}

/// JPEG: walk the marker segments until an SOFn frame header, whose body
/// carries height then width as big-endian u16s after a one-byte precision
/// field.
fn convert_jpeg_dimensions(resource: &dyn Resource) -> Result<ConversionValue, CoreError> {
    let bytes = read_all(resource)?;
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return Err(CoreError::conversion_failure("not a valid JPEG header"));
    }
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = bytes[i + 1];
        if (0xC0..=0xCF).contains(&marker) && marker != 0xC4 && marker != 0xC8 && marker != 0xCC {
            let height = u16::from_be_bytes(bytes[i + 5..i + 7].try_into().unwrap()) as u32;
            let width = u16::from_be_bytes(bytes[i + 7..i + 9].try_into().unwrap()) as u32;
            return Ok(ConversionValue::ImageDimensions { width, height });
        }
        let segment_len = u16::from_be_bytes(bytes[i + 2..i + 4].try_into().unwrap()) as usize;
        i += 2 + segment_len;
    }
    Err(CoreError::conversion_failure("no SOF marker found in JPEG"))
}

/// Best-effort machine-readable-zone extraction from already-extracted text
/// (OCR itself is out of scope, §1): an MRZ line is 30/36/44 characters of
/// `A-Z0-9<`.
fn convert_mrz(resource: &dyn Resource) -> Result<ConversionValue, CoreError> {
    let ConversionValue::Text(text) = convert_text(resource)? else { unreachable!() };
    let mrz_line = |line: &str| {
        matches!(line.len(), 30 | 36 | 44) && line.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'<')
    };
    let lines: Vec<&str> = text.lines().filter(|l| mrz_line(l)).collect();
    if lines.is_empty() {
        return Err(CoreError::conversion_failure("no MRZ-shaped lines found"));
    }
    Ok(ConversionValue::Mrz(lines.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_api::{FileSource, Handle, Source};
    use std::io::Cursor;

    struct FixedResource(Vec<u8>);
    impl Resource for FixedResource {
        fn handle(&self) -> &Handle {
            unimplemented!()
        }
        fn compute_type(&self) -> Result<String, CoreError> {
            Ok("text/plain".to_string())
        }
        fn make_stream(&self) -> Result<Box<dyn Read + Send>, CoreError> {
            Ok(Box::new(Cursor::new(self.0.clone())))
        }
    }

    #[test]
    fn text_conversion_reads_utf8_body() {
        let r = FixedResource(b"hello world".to_vec());
        let ConversionValue::Text(t) = convert(OutputType::Text, &r).unwrap() else { panic!() };
        assert_eq!(t, "hello world");
    }

    #[test]
    fn png_header_reports_dimensions() {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 13]); // chunk length, unused
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&100u32.to_be_bytes());
        bytes.extend_from_slice(&200u32.to_be_bytes());
        struct Png(Vec<u8>);
        impl Resource for Png {
            fn handle(&self) -> &Handle {
                unimplemented!()
            }
            fn compute_type(&self) -> Result<String, CoreError> {
                Ok("image/png".to_string())
            }
            fn make_stream(&self) -> Result<Box<dyn Read + Send>, CoreError> {
                Ok(Box::new(Cursor::new(self.0.clone())))
            }
        }
        let r = Png(bytes);
        let ConversionValue::ImageDimensions { width, height } =
            convert(OutputType::ImageDimensions, &r).unwrap()
        else {
            panic!()
        };
        assert_eq!((width, height), (100, 200));
    }

    #[test]
    fn unmatched_output_type_is_a_conversion_failure() {
        let r = FixedResource(vec![]);
        let err = convert(OutputType::Links, &r).unwrap_err();
        // text/plain has no Links converter registered, so this must fail
        // rather than silently falling back to an unrelated entry.
        assert_eq!(err.kind, scan_api::ErrorKind::ConversionFailure);
    }

    #[allow(dead_code)]
    fn unused_handle_constructor() -> Handle {
        Handle::new(Source::File(FileSource { path: "/tmp".into() }), String::new())
    }
}

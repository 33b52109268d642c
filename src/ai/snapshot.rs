//! Page snapshot reduction
//!
//! Shrinks a raw UI hierarchy dump to the attributes that matter for
//! locating elements, one element per line, indented by depth.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Attributes kept in the reduced snapshot
pub const ATTRIBUTE_ALLOW_LIST: [&str; 9] = [
    "text",
    "content-desc",
    "resource-id",
    "name",
    "label",
    "value",
    "id",
    "placeholder",
    "href",
];

/// Class prefixes dropped from element names
const CLASS_PREFIXES: [&str; 3] = ["android.widget.", "android.view.", "XCUIElementType"];

/// Default character limit for a reduced snapshot
pub const DEFAULT_MAX_CHARS: usize = 12_000;

/// Reduce a raw page source, keeping at most `max_chars` characters.
///
/// Input that is not parseable as XML, or keeps nothing, degrades to a
/// truncated copy.
pub fn reduce(raw: &str, max_chars: usize) -> String {
    match reduce_xml(raw) {
        Ok(reduced) if !reduced.is_empty() => truncate(&reduced, max_chars),
        Ok(_) => truncate(raw.trim(), max_chars),
        Err(e) => {
            log::debug!("Snapshot is not XML ({}), passing through", e);
            truncate(raw.trim(), max_chars)
        }
    }
}

fn reduce_xml(raw: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(raw);
    reader.trim_text(true);
    reader.check_end_names(false);

    let mut out = String::new();
    let mut depth = 0usize;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                push_element(&mut out, e, depth);
                depth += 1;
            }
            Event::Empty(ref e) => push_element(&mut out, e, depth),
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

fn push_element(out: &mut String, e: &BytesStart, depth: usize) {
    let mut class = None;
    let mut kept = Vec::new();

    for attr in e.attributes().filter_map(|a| a.ok()) {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map(|v| v.to_string())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).to_string());

        if value.trim().is_empty() {
            continue;
        }
        if key == "class" || key == "type" {
            class = Some(value);
        } else if ATTRIBUTE_ALLOW_LIST.contains(&key.as_str()) {
            kept.push(format!("{}=\"{}\"", key, value.replace('\n', " ")));
        }
    }

    if kept.is_empty() {
        return;
    }

    let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let name = short_class(class.as_deref().unwrap_or(&tag));
    out.push_str(&"  ".repeat(depth));
    out.push_str(name);
    out.push(' ');
    out.push_str(&kept.join(" "));
    out.push('\n');
}

fn short_class(class: &str) -> &str {
    CLASS_PREFIXES
        .iter()
        .find_map(|p| class.strip_prefix(p))
        .unwrap_or(class)
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

use std::collections::BTreeMap;

use quick_xml::{events::Event as XmlEvent, Reader as XmlReader};

use crate::error::BlobError;

// ── XML helpers ───────────────────────────────────────────────────────────────

/// Find the text content of the first `<tag>…</tag>` element in XML.
/// Skips over nested elements; returns `None` if not found or empty.
pub(crate) fn xml_text(xml: &str, tag: &str) -> Option<String> {
    let tag_bytes  = tag.as_bytes();
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut in_tag = false;
    let mut depth: usize = 0;

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) => {
                if !in_tag && e.local_name().as_ref() == tag_bytes {
                    in_tag = true;
                    depth  = 0;
                } else if in_tag {
                    depth += 1;
                }
            }
            Ok(XmlEvent::End(_)) => {
                if in_tag {
                    if depth == 0 { return None; }
                    depth -= 1;
                }
            }
            Ok(XmlEvent::Text(e)) if in_tag && depth == 0 => {
                return e.unescape().ok().map(|s| s.into_owned());
            }
            Ok(XmlEvent::Eof) | Err(_) => break,
            _ => {}
        }
    }
    None
}

/// Inner XML of every `<tag>…</tag>` element, outermost occurrences only.
pub(crate) fn xml_elements(xml: &str, tag: &str) -> Result<Vec<String>, BlobError> {
    let tag_bytes  = tag.as_bytes();
    let mut reader = XmlReader::from_str(xml);
    let mut out    = Vec::new();
    let mut start: Option<usize> = None;
    let mut depth: usize = 0;

    loop {
        let before = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) if e.local_name().as_ref() == tag_bytes => {
                if depth == 0 {
                    start = Some(reader.buffer_position() as usize);
                }
                depth += 1;
            }
            Ok(XmlEvent::End(e)) if e.local_name().as_ref() == tag_bytes && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(from) = start.take() {
                        out.push(xml[from..before].to_string());
                    }
                }
            }
            Ok(XmlEvent::Empty(e)) if e.local_name().as_ref() == tag_bytes && depth == 0 => {
                out.push(String::new());
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(BlobError::Xml(e.to_string())),
            _ => {}
        }
    }
    Ok(out)
}

/// Direct children of an XML fragment as `(name, text)` pairs.
pub(crate) fn xml_children(xml: &str) -> BTreeMap<String, String> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut out     = BTreeMap::new();
    let mut current: Option<String> = None;
    let mut depth: usize = 0;

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) => {
                depth += 1;
                if depth == 1 {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    out.insert(name.clone(), String::new());
                    current = Some(name);
                }
            }
            Ok(XmlEvent::Empty(e)) if depth == 0 => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                out.insert(name, String::new());
            }
            Ok(XmlEvent::End(_)) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    current = None;
                }
            }
            Ok(XmlEvent::Text(e)) if depth == 1 => {
                if let (Some(name), Ok(text)) = (&current, e.unescape()) {
                    out.insert(name.clone(), text.into_owned());
                }
            }
            Ok(XmlEvent::Eof) | Err(_) => break,
            _ => {}
        }
    }
    out
}

/// `(code, message)` of a storage error body.
pub(crate) fn xml_error(xml: &str) -> (String, String) {
    (
        xml_text(xml, "Code").unwrap_or_else(|| "Unknown".into()),
        xml_text(xml, "Message").unwrap_or_else(|| "unknown error".into()),
    )
}

fn escape(s: &str) -> String {
    quick_xml::escape::escape(s).into_owned()
}

/// Put Block List body; blocks are committed in the given order.
pub(crate) fn block_list_xml(block_ids: &[String]) -> String {
    let mut body = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList>");
    for id in block_ids {
        body.push_str(&format!("<Latest>{}</Latest>", escape(id)));
    }
    body.push_str("</BlockList>");
    body
}

//! Durable encoding of a [`Document`].
//!
//! The format is a JSON object with `background`, `elements` and `next_id`
//! fields. Encoding is deterministic: field order is fixed by the wire structs,
//! all numbers are integers and embedded image bytes are standard base64.

use std::borrow::Cow;
use std::collections::HashSet;

use base64::Engine as Base64Engine;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CodecError;
use crate::model::{Background, Document, Element, ElementId, Position};

#[derive(Serialize, Deserialize)]
struct WireDocument<'a> {
    background: WireBackground<'a>,
    elements: Vec<WireElement<'a>>,
    /// Absent in files written before the counter was persisted
    #[serde(default)]
    next_id: Option<u64>,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WireBackground<'a> {
    Blank,
    Url { url: Cow<'a, str> },
    ImageData { data: String },
}

#[derive(Serialize, Deserialize)]
struct WireElement<'a> {
    id: u64,
    content: Cow<'a, str>,
    x: i32,
    y: i32,
    size: i32,
}

/// Encode a document into its durable byte form.
pub fn encode(document: &Document) -> Result<Vec<u8>, CodecError> {
    let background = match document.background() {
        Background::Blank => WireBackground::Blank,
        Background::Url(url) => WireBackground::Url {
            url: Cow::Borrowed(url.as_str()),
        },
        Background::ImageData(bytes) => WireBackground::ImageData {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        },
    };

    let elements = document
        .elements()
        .iter()
        .map(|e| WireElement {
            id: e.id().0,
            content: Cow::Borrowed(e.content()),
            x: e.position().x,
            y: e.position().y,
            size: e.size(),
        })
        .collect();

    let wire = WireDocument {
        background,
        elements,
        next_id: Some(document.next_id()),
    };

    serde_json::to_vec(&wire).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode and validate a previously encoded document.
pub fn decode(bytes: &[u8]) -> Result<Document, CodecError> {
    let wire: WireDocument<'_> =
        serde_json::from_slice(bytes).map_err(|e| CodecError::MalformedData(e.to_string()))?;

    let background = match wire.background {
        WireBackground::Blank => Background::Blank,
        WireBackground::Url { url } => {
            let parsed = Url::parse(&url).map_err(|e| {
                CodecError::SchemaViolation(format!("invalid background url {:?}: {}", url, e))
            })?;
            Background::Url(parsed)
        }
        WireBackground::ImageData { data } => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(data.as_bytes())
                .map_err(|e| {
                    CodecError::SchemaViolation(format!("invalid base64 image data: {}", e))
                })?;
            Background::ImageData(bytes)
        }
    };

    let mut seen = HashSet::with_capacity(wire.elements.len());
    let mut elements = Vec::with_capacity(wire.elements.len());
    for e in wire.elements {
        if !seen.insert(e.id) {
            return Err(CodecError::SchemaViolation(format!("duplicate element id {}", e.id)));
        }
        if e.content.is_empty() {
            return Err(CodecError::SchemaViolation(format!("element {} has empty content", e.id)));
        }
        if e.size <= 0 {
            return Err(CodecError::SchemaViolation(format!(
                "element {} has non-positive size {}",
                e.id, e.size
            )));
        }
        elements.push(Element::from_parts(
            ElementId(e.id),
            e.content.into_owned(),
            Position::new(e.x, e.y),
            e.size,
        ));
    }

    let max_id = seen.iter().copied().max();
    let next_id = match (wire.next_id, max_id) {
        (Some(next), Some(max)) if next <= max => {
            return Err(CodecError::SchemaViolation(format!(
                "next_id {} does not exceed element id {}",
                next, max
            )));
        }
        (Some(next), _) => next,
        (None, Some(max)) => max.checked_add(1).ok_or_else(|| {
            CodecError::SchemaViolation("element id space exhausted".to_string())
        })?,
        (None, None) => 1,
    };

    Ok(Document::from_parts(background, elements, next_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;

    fn sample() -> Document {
        let mut doc = Document::new();
        doc.add_element("😀", Position::new(-200, -100), 80).unwrap();
        let change = doc.add_element("😷", Position::new(50, 100), 40).unwrap();
        doc.add_element("🌵", Position::new(0, 0), 20).unwrap();
        doc.remove_element(change.element_id().unwrap());
        doc.set_background(Background::Url(Url::parse("https://example.com/bg.jpg").unwrap()));
        doc
    }

    #[test]
    fn round_trips_every_background_kind() {
        let mut doc = sample();
        assert_eq!(decode(&encode(&doc).unwrap()).unwrap(), doc);

        doc.set_background(Background::ImageData(vec![0, 1, 2, 254, 255]));
        assert_eq!(decode(&encode(&doc).unwrap()).unwrap(), doc);

        doc.set_background(Background::Blank);
        assert_eq!(decode(&encode(&doc).unwrap()).unwrap(), doc);

        let empty = Document::new();
        assert_eq!(decode(&encode(&empty).unwrap()).unwrap(), empty);
    }

    #[test]
    fn encoding_is_deterministic() {
        let doc = sample();
        assert_eq!(encode(&doc).unwrap(), encode(&doc.clone()).unwrap());
    }

    #[test]
    fn wire_shape_is_stable() {
        let mut doc = Document::new();
        doc.add_element("a", Position::new(1, -2), 3).unwrap();
        let json = String::from_utf8(encode(&doc).unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"background":{"kind":"blank"},"elements":[{"id":1,"content":"a","x":1,"y":-2,"size":3}],"next_id":2}"#
        );
    }

    #[test]
    fn duplicate_ids_are_a_schema_violation() {
        let bytes = br#"{"background":{"kind":"blank"},"elements":[
            {"id":1,"content":"a","x":0,"y":0,"size":10},
            {"id":1,"content":"b","x":5,"y":5,"size":10}]}"#;
        assert!(matches!(decode(bytes), Err(CodecError::SchemaViolation(_))));
    }

    #[test]
    fn invariant_breaking_fields_are_schema_violations() {
        let cases: [&[u8]; 5] = [
            br#"{"background":{"kind":"blank"},"elements":[{"id":1,"content":"","x":0,"y":0,"size":10}]}"#,
            br#"{"background":{"kind":"blank"},"elements":[{"id":1,"content":"a","x":0,"y":0,"size":0}]}"#,
            br#"{"background":{"kind":"blank"},"elements":[{"id":4,"content":"a","x":0,"y":0,"size":1}],"next_id":4}"#,
            br#"{"background":{"kind":"url","url":"not a url"},"elements":[]}"#,
            br#"{"background":{"kind":"image_data","data":"***"},"elements":[]}"#,
        ];
        for bytes in cases {
            assert!(
                matches!(decode(bytes), Err(CodecError::SchemaViolation(_))),
                "expected schema violation for {}",
                String::from_utf8_lossy(bytes)
            );
        }
    }

    #[test]
    fn unparseable_bytes_are_malformed() {
        let cases: [&[u8]; 4] = [
            b"",
            b"not json",
            br#"{"elements":[]}"#,
            br#"{"background":{"kind":"blank"},"elements":[{"id":"one","content":"a","x":0,"y":0,"size":1}]}"#,
        ];
        for bytes in cases {
            assert!(matches!(decode(bytes), Err(CodecError::MalformedData(_))));
        }
    }

    #[test]
    fn missing_counter_is_derived_from_ids() {
        let bytes = br#"{"background":{"kind":"blank"},"elements":[
            {"id":3,"content":"a","x":0,"y":0,"size":10},
            {"id":9,"content":"b","x":0,"y":0,"size":10}]}"#;
        let doc = decode(bytes).unwrap();
        assert_eq!(doc.next_id(), 10);
        assert_eq!(doc.elements()[1].id(), ElementId(9));
    }

    #[test]
    fn largest_counter_decodes_but_issues_no_ids() {
        let bytes = br#"{"background":{"kind":"blank"},"elements":[],"next_id":18446744073709551615}"#;
        let mut doc = decode(bytes).unwrap();
        assert_eq!(doc.next_id(), u64::MAX);
        assert_eq!(
            doc.add_element("a", Position::default(), 10),
            Err(ModelError::IdSpaceExhausted)
        );
        assert!(doc.is_empty());
        assert_eq!(decode(&encode(&doc).unwrap()).unwrap(), doc);
    }

    #[test]
    fn largest_element_id_without_counter_is_rejected() {
        let bytes = br#"{"background":{"kind":"blank"},"elements":[
            {"id":18446744073709551615,"content":"a","x":0,"y":0,"size":10}]}"#;
        assert!(matches!(decode(bytes), Err(CodecError::SchemaViolation(_))));
    }
}

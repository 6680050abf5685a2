use std::collections::BTreeMap;

use super::*;

fn json(raw: &str) -> Document {
    serde_json::from_str(raw).unwrap()
}

#[test]
fn test_untagged_variants_decode() {
    let doc = json(r#"{"b":true,"i":-3,"f":1.5,"s":"x","l":[1,null],"m":{}}"#);

    assert_eq!(doc.get(&["b"]), Some(&Document::Bool(true)));
    assert_eq!(doc.get(&["i"]), Some(&Document::Int(-3)));
    assert_eq!(doc.get(&["f"]), Some(&Document::Float(1.5)));
    assert_eq!(doc.get(&["s"]), Some(&Document::String("x".to_string())));
    assert_eq!(
        doc.get(&["l"]),
        Some(&Document::Seq(vec![Document::Int(1), Document::Null]))
    );
    assert_eq!(doc.get(&["m"]), Some(&Document::Map(BTreeMap::new())));
    assert_eq!(doc.get(&["s", "deeper"]), None);
}

#[test]
fn test_encoding_sorts_map_keys() {
    let doc = json(r#"{"z":1,"a":{"y":2,"b":3}}"#);
    let encoded = JsonEncoder.encode(&doc).unwrap();
    assert_eq!(&encoded[..], br#"{"a":{"b":3,"y":2},"z":1}"#);
}

#[test]
fn test_nested_patch_creates_intermediate_maps() {
    let mut doc = Document::empty();
    doc.patch(&["database", "address"], Some(Document::String("10.0.0.1".into())));
    doc.patch(&["database", "port"], Some(Document::Int(3306)));

    assert_eq!(doc, json(r#"{"database":{"address":"10.0.0.1","port":3306}}"#));
}

#[test]
fn test_nested_patch_overwrites_scalar_parents() {
    let mut doc = json(r#"{"database":"legacy"}"#);
    doc.patch(&["database", "port"], Some(Document::Int(1)));

    assert_eq!(doc, json(r#"{"database":{"port":1}}"#));
}

#[test]
fn test_nested_delete_removes_only_leaf() {
    let mut doc = json(r#"{"database":{"address":"a","port":1},"cache":{"ttl":5}}"#);
    doc.patch(&["database", "port"], None);

    assert_eq!(doc, json(r#"{"database":{"address":"a"},"cache":{"ttl":5}}"#));
}

#[test]
fn test_single_segment_put_replaces_document_with_map() {
    let mut doc = json(r#"{"old":1}"#);
    doc.patch(&["all"], Some(json(r#"{"new":2}"#)));
    assert_eq!(doc, json(r#"{"new":2}"#));

    doc.patch(&["scalar"], Some(Document::Int(3)));
    assert_eq!(doc, json(r#"{"new":2}"#));
}

#[test]
fn test_single_segment_delete_clears_document() {
    let mut doc = json(r#"{"a":{"b":1}}"#);
    doc.patch(&["a"], None);
    assert_eq!(doc, Document::empty());
}

#[test]
fn test_json_encoder_round_trip_is_byte_identical() {
    let raw = br#"{"a":[1,2.5,"x",null,false],"b":{"c":{"d":-7}}}"#;
    let doc = JsonEncoder.decode(raw).unwrap();
    assert_eq!(&JsonEncoder.encode(&doc).unwrap()[..], &raw[..]);
    assert_eq!(JsonEncoder.format(), "json");
}

#[test]
fn test_json_encoder_rejects_garbage() {
    assert!(matches!(JsonEncoder.decode(b"{nope"), Err(crate::Error::Decode(_))));
}

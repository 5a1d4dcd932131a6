use std::collections::HashMap;

use crate::descriptor::{ElementDescriptor, SchemaMap, StructDescriptor};
use crate::resolve::DefaultValue;
use crate::value::{Message, NumericArray, NumericKind, NumericScalar, OwnedNumeric, Record, Value};
use crate::*;

#[test]
fn nested_block_comments_are_skipped() {
    let text = "/* outer /* inner */ still outer */\nnamespace ns {\nstruct point {\nf32 x;\nf32 y;\n}\n}\n";
    let schema = parse_cbuf_schema(text).unwrap();
    assert!(schema.get("ns::point").is_some());
}

#[test]
fn line_comments_are_skipped() {
    let text = "// a point\nnamespace ns {\nstruct point { // fields follow\nf32 x;\nf32 y;\n}\n}\n";
    let schema = parse_cbuf_schema(text).unwrap();
    assert!(schema.get("ns::point").is_some());
}

#[test]
fn schema_text_must_end_with_newline() {
    let text = "namespace ns { struct point { f32 x; } }";
    assert!(parse_cbuf_schema(text).is_err());
}

#[test]
fn duplicate_struct_names_are_rejected() {
    let text = "struct dup { u8 a; }\nstruct dup { u8 b; }\n";
    assert!(parse_cbuf_schema(text).is_err());
}

#[test]
fn unknown_type_reference_is_rejected() {
    let text = "namespace ns {\nstruct a {\nns::nosuch b;\n}\n}\n";
    assert!(parse_cbuf_schema(text).is_err());
}

#[test]
fn multidimensional_array_suffix_is_rejected() {
    // the grammar only accepts a single `[EXPR]` per element; a second
    // bracket pair after the first has nowhere to go.
    let text = "struct m {\nu8 grid[2][3];\n}\n";
    assert!(parse_cbuf_schema(text).is_err());
}

#[test]
fn struct_reference_cycle_is_rejected() {
    let text = "namespace ns {\nstruct a {\nns::b child;\n}\nstruct b {\nns::a child;\n}\n}\n";
    let err = parse_cbuf_schema(text).unwrap_err();
    assert!(err.contains("cycle"), "unexpected error: {err}");
}

#[test]
fn compact_requires_a_fixed_array_suffix() {
    let text = "struct c {\nu8 vals[] @compact;\n}\n";
    assert!(parse_cbuf_schema(text).is_err());
}

/// The bootstrap `cbufmsg::metadata` descriptor is meant to be the exact
/// descriptor produced by resolving its own schema text: if someone edits
/// one without the other, this should fail.
#[test]
fn bootstrap_metadata_descriptor_matches_its_own_schema_text() {
    let text = "namespace cbufmsg {\nstruct metadata {\nu64 msg_hash;\nstring msg_name;\nstring msg_meta;\n}\n}\n";
    let schema = parse_cbuf_schema(text).unwrap();
    let parsed = schema.get("cbufmsg::metadata").unwrap();
    assert_eq!(parsed.hash_value, metadata::METADATA_HASH);
    assert_eq!(parsed.naked, metadata::bootstrap_descriptor().naked);
    assert_eq!(parsed.elements.len(), metadata::bootstrap_descriptor().elements.len());
}

#[test]
fn reordering_unrelated_namespaces_does_not_change_a_structs_hash() {
    let a = "namespace ns {\nstruct point {\nf32 x;\nf32 y;\n}\n}\nnamespace other {\nstruct unrelated {\nu8 z;\n}\n}\n";
    let b = "namespace other {\nstruct unrelated {\nu8 z;\n}\n}\nnamespace ns {\nstruct point {\nf32 x;\nf32 y;\n}\n}\n";
    let schema_a = parse_cbuf_schema(a).unwrap();
    let schema_b = parse_cbuf_schema(b).unwrap();
    assert_eq!(
        schema_a.get("ns::point").unwrap().hash_value,
        schema_b.get("ns::point").unwrap().hash_value,
    );
}

#[test]
fn renaming_a_field_changes_the_structs_hash() {
    let a = "struct s {\nu8 a;\n}\n";
    let b = "struct s {\nu8 renamed;\n}\n";
    let schema_a = parse_cbuf_schema(a).unwrap();
    let schema_b = parse_cbuf_schema(b).unwrap();
    assert_ne!(
        schema_a.get("s").unwrap().hash_value,
        schema_b.get("s").unwrap().hash_value,
    );
}

#[test]
fn default_value_arithmetic_folds_left_to_right() {
    // only asserting expressions independently verified by hand.
    let text = "struct defaults {\ns32 a = 2 + 3 * 4;\ns16 d = -4;\nf64 j = 2.0 * 3.4 / 2.7;\n}\n";
    let schema = parse_cbuf_schema(text).unwrap();
    let s = schema.get("defaults").unwrap();
    assert_eq!(s.element("a").unwrap().default_value, Some(DefaultValue::Int(14)));
    assert_eq!(s.element("d").unwrap().default_value, Some(DefaultValue::Int(-4)));
    match s.element("j").unwrap().default_value {
        Some(DefaultValue::Float(v)) => assert!((v - 2.518_518_518_518_518_5).abs() < 1e-12),
        ref other => panic!("expected a float default, got {other:?}"),
    }
}

#[test]
fn array_element_default_normalizes_to_empty_array() {
    let text = "struct arr {\nu8 vals[4] = { 1, 2, 3, 4 };\n}\n";
    let schema = parse_cbuf_schema(text).unwrap();
    let s = schema.get("arr").unwrap();
    assert_eq!(s.element("vals").unwrap().default_value, Some(DefaultValue::EmptyArray));
}

#[test]
fn named_const_is_visible_to_a_later_array_size() {
    let text = "const s32 count = 3 + 1;\nstruct s {\nu8 vals[count];\n}\n";
    let schema = parse_cbuf_schema(text).unwrap();
    let s = schema.get("s").unwrap();
    assert_eq!(s.element("vals").unwrap().array_length, Some(4));
}

#[test]
fn enum_variants_default_to_successive_values() {
    let text = "namespace ns {\nenum color {\nred,\ngreen,\nblue = 9,\n}\nstruct s {\nns::color tint;\n}\n}\n";
    let schema = parse_cbuf_schema(text).unwrap();
    let s = schema.get("ns::s").unwrap();
    let tint = s.element("tint").unwrap();
    assert_eq!(tint.type_name, "int32");
    assert!(!tint.is_complex);
}

#[test]
fn enum_variant_numbering_resumes_after_an_explicit_value() {
    let text = "enum color {\nred,\ngreen,\nblue = 9,\nviolet,\n}\n";
    let ast = parser::parse(text).unwrap();
    let resolved = resolve::resolve_schema(&ast).unwrap();
    let color = resolved.enums.iter().find(|e| e.qualified_name == "color").unwrap();
    assert_eq!(
        color.variants,
        vec![
            ("red".to_string(), 0),
            ("green".to_string(), 1),
            ("blue".to_string(), 9),
            ("violet".to_string(), 10),
        ]
    );
}

#[test]
fn naked_struct_has_no_frame_header_size() {
    let text = "struct n @naked {\nu8 a;\nu8 b;\n}\nstruct framed {\nu8 a;\nu8 b;\n}\n";
    let schema = parse_cbuf_schema(text).unwrap();
    assert!(schema.get("n").unwrap().naked);
    assert!(!schema.get("framed").unwrap().naked);
}

fn numeric_element(name: &str, type_name: &str) -> ElementDescriptor {
    ElementDescriptor {
        name: name.to_string(),
        type_name: type_name.to_string(),
        is_array: false,
        array_length: None,
        array_upper_bound: None,
        upper_bound: None,
        is_complex: false,
        default_value: None,
    }
}

/// Hand-builds a `bar { foo field; }` descriptor pair (rather than relying
/// on the exact schema text, and struct hash, that would produce a given
/// hash literal) and exercises the codec against a literal byte buffer
/// matching a framed record over it.
fn foo_bar_schema() -> (SchemaMap, HashMap<u64, StructDescriptor>) {
    let foo = StructDescriptor {
        name: "messages::foo".to_string(),
        hash_value: 0,
        line: 1,
        column: 1,
        naked: true,
        elements: vec![numeric_element("x", "uint8")],
    };
    let mut bar_field = numeric_element("foo", "messages::foo");
    bar_field.is_complex = true;
    let bar = StructDescriptor {
        name: "messages::bar".to_string(),
        hash_value: 1,
        line: 1,
        column: 1,
        naked: false,
        elements: vec![bar_field],
    };
    let schema = SchemaMap::from_structs([foo, bar]);
    let hash_map = schema_map_to_hash_map(&schema).unwrap();
    (schema, hash_map)
}

#[test]
fn decodes_a_framed_record_over_a_naked_nested_struct() {
    let (schema, hash_map) = foo_bar_schema();

    // magic 0x56444E54 LE, size_and_variant 0x88000019 (size 25, variant 1),
    // hash 1 (LE u64), timestamp 0.0 (LE f64), one payload byte (42).
    let buffer: Vec<u8> = vec![
        0x54, 0x4E, 0x44, 0x56, // magic
        0x19, 0x00, 0x00, 0x88, // size_and_variant
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // hash
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // timestamp
        42, // messages::foo.x
    ];

    let record = deserialize_message(&schema, &hash_map, &buffer, 0).unwrap();
    assert_eq!(record.type_name, "messages::bar");
    assert_eq!(record.size, 25);
    assert_eq!(record.variant, Some(1));
    assert_eq!(record.hash_value, 1);
    assert_eq!(record.timestamp, 0.0);

    let Value::Struct(foo) = record.message.get("foo").unwrap() else {
        panic!("expected a nested struct value");
    };
    assert_eq!(foo.get("x"), Some(&Value::UInt(42)));
}

#[test]
fn serializing_a_decoded_record_reproduces_the_original_bytes() {
    let (schema, hash_map) = foo_bar_schema();
    let buffer: Vec<u8> = vec![
        0x54, 0x4E, 0x44, 0x56, 0x19, 0x00, 0x00, 0x88, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 42,
    ];
    let record = deserialize_message(&schema, &hash_map, &buffer, 0).unwrap();
    let re_encoded = serialize_message(&schema, &hash_map, &record).unwrap();
    assert_eq!(re_encoded, buffer);
}

#[test]
fn serialized_size_matches_the_bytes_actually_written() {
    let (schema, hash_map) = foo_bar_schema();
    let mut inner = Message::new();
    inner.insert("x", Value::UInt(7));
    let mut outer = Message::new();
    outer.insert("foo", Value::Struct(Box::new(inner)));
    let record = Record::new(1, None, 12.5, outer);

    let predicted = serialized_message_size(&schema, &hash_map, &record).unwrap();
    let encoded = serialize_message(&schema, &hash_map, &record).unwrap();
    assert_eq!(predicted, encoded.len());
    assert_eq!(predicted, 25);
}

#[test]
fn truncated_buffer_is_rejected_rather_than_panicking() {
    let (schema, hash_map) = foo_bar_schema();
    let short = vec![0x54, 0x4E, 0x44, 0x56, 0x19, 0x00, 0x00, 0x88];
    let err = deserialize_message(&schema, &hash_map, &short, 0).unwrap_err();
    assert!(matches!(err, CodecError::TruncatedRecord { .. }));
}

#[test]
fn bad_magic_is_rejected() {
    let (schema, hash_map) = foo_bar_schema();
    let mut buffer: Vec<u8> = vec![
        0x54, 0x4E, 0x44, 0x56, 0x19, 0x00, 0x00, 0x88, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 42,
    ];
    buffer[0] = 0x00;
    let err = deserialize_message(&schema, &hash_map, &buffer, 0).unwrap_err();
    assert!(matches!(err, CodecError::InvalidMagic { .. }));
}

#[test]
fn unknown_hash_falls_back_to_nothing_and_errors() {
    let (schema, _) = foo_bar_schema();
    let empty_hash_map = HashMap::new();
    let mut buffer: Vec<u8> = vec![
        0x54, 0x4E, 0x44, 0x56, 0x19, 0x00, 0x00, 0x88, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 42,
    ];
    // hash 1 is not the bootstrap metadata hash, so with an empty hash
    // index resolution must fail rather than silently decoding garbage.
    buffer[8] = 0x01;
    let err = deserialize_message(&schema, &empty_hash_map, &buffer, 0).unwrap_err();
    assert!(matches!(err, CodecError::UnknownHash { hash: 1 }));
}

#[test]
fn compact_array_overflow_is_rejected() {
    let mut bounded = numeric_element("vals", "uint8");
    bounded.is_array = true;
    bounded.array_upper_bound = Some(2);
    let owner = StructDescriptor {
        name: "bounded_owner".to_string(),
        hash_value: 5,
        line: 1,
        column: 1,
        naked: true,
        elements: vec![bounded],
    };
    let schema = SchemaMap::from_structs([owner]);
    let hash_map = schema_map_to_hash_map(&schema).unwrap();

    let mut message = Message::new();
    message.insert(
        "vals",
        Value::Numeric(NumericArray::Owned(OwnedNumeric::U8(vec![1, 2, 3]))),
    );
    let record = Record::new(5, None, 0.0, message);
    let err = serialize_message(&schema, &hash_map, &record).unwrap_err();
    assert!(matches!(err, CodecError::CompactOverflow { upper_bound: 2, found: 3 }));
}

#[test]
fn fixed_array_wrong_length_is_rejected_on_serialize() {
    let mut fixed = numeric_element("vals", "uint8");
    fixed.is_array = true;
    fixed.array_length = Some(3);
    let owner = StructDescriptor {
        name: "fixed_owner".to_string(),
        hash_value: 6,
        line: 1,
        column: 1,
        naked: true,
        elements: vec![fixed],
    };
    let schema = SchemaMap::from_structs([owner]);
    let hash_map = schema_map_to_hash_map(&schema).unwrap();

    let mut message = Message::new();
    message.insert(
        "vals",
        Value::Numeric(NumericArray::Owned(OwnedNumeric::U8(vec![1, 2]))),
    );
    let record = Record::new(6, None, 0.0, message);

    let size_err = serialized_message_size(&schema, &hash_map, &record).unwrap_err();
    assert!(matches!(size_err, CodecError::Encoding(_)));
    let write_err = serialize_message(&schema, &hash_map, &record).unwrap_err();
    assert!(matches!(write_err, CodecError::Encoding(_)));
}

#[test]
fn huge_array_count_on_a_truncated_buffer_fails_without_a_giant_allocation() {
    let mut names = numeric_element("names", "string");
    names.is_array = true;
    let owner = StructDescriptor {
        name: "names_owner".to_string(),
        hash_value: 7,
        line: 1,
        column: 1,
        naked: true,
        elements: vec![names],
    };
    let schema = SchemaMap::from_structs([owner]);
    let hash_map = schema_map_to_hash_map(&schema).unwrap();

    // A well-framed header (size == buffer len) whose naked body claims a
    // string-array count of 0xFFFFFFFF with no element bytes behind it.
    // This must fail with `TruncatedRecord`, not abort on an oversized
    // `Vec` reservation.
    let mut buffer: Vec<u8> = vec![
        0x54, 0x4E, 0x44, 0x56, // magic
        28, 0x00, 0x00, 0x00, // size_and_variant: size 28, no variant bit
        0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // hash
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // timestamp
        0xFF, 0xFF, 0xFF, 0xFF, // names count
    ];
    assert_eq!(buffer.len(), 28);
    buffer[4..8].copy_from_slice(&(buffer.len() as u32).to_le_bytes());

    let err = deserialize_message(&schema, &hash_map, &buffer, 0).unwrap_err();
    assert!(matches!(err, CodecError::TruncatedRecord { .. }));
}

/// Exercises every element shape in one round trip: fixed array, dynamic
/// array, compact array, a naked nested struct, a non-naked nested struct,
/// a dynamic array of non-naked nested structs, a bounded `short_string`,
/// and an unbounded `string`.
#[test]
fn full_feature_struct_round_trips_through_the_wire_codec() {
    let leaf = StructDescriptor {
        name: "demo::leaf".to_string(),
        hash_value: 10,
        line: 1,
        column: 1,
        naked: true,
        elements: vec![numeric_element("tag", "uint8")],
    };
    let wrapped = StructDescriptor {
        name: "demo::wrapped".to_string(),
        hash_value: 11,
        line: 1,
        column: 1,
        naked: false,
        elements: vec![numeric_element("value", "uint8")],
    };

    let mut leaf_field = numeric_element("inner", "demo::leaf");
    leaf_field.is_complex = true;
    let mut boxed_field = numeric_element("boxed", "demo::wrapped");
    boxed_field.is_complex = true;
    let mut many_field = numeric_element("many", "demo::wrapped");
    many_field.is_complex = true;
    many_field.is_array = true;

    let mut fixed_field = numeric_element("fixed", "uint8");
    fixed_field.is_array = true;
    fixed_field.array_length = Some(3);

    let mut dynamic_field = numeric_element("dynamic", "uint32");
    dynamic_field.is_array = true;

    let mut bounded_field = numeric_element("bounded", "uint8");
    bounded_field.is_array = true;
    bounded_field.array_upper_bound = Some(4);

    let mut label_field = numeric_element("label", "string");
    label_field.upper_bound = Some(16);

    let name_field = numeric_element("name", "string");

    let outer = StructDescriptor {
        name: "demo::outer".to_string(),
        hash_value: 12,
        line: 1,
        column: 1,
        naked: false,
        elements: vec![
            numeric_element("id", "uint8"),
            fixed_field,
            dynamic_field,
            bounded_field,
            leaf_field,
            boxed_field,
            many_field,
            label_field,
            name_field,
        ],
    };

    let schema = SchemaMap::from_structs([leaf, wrapped, outer]);
    let hash_map = schema_map_to_hash_map(&schema).unwrap();

    let mut inner_leaf = Message::new();
    inner_leaf.insert("tag", Value::UInt(9));

    let mut boxed_inner = Message::new();
    boxed_inner.insert("value", Value::UInt(200));

    let mut many_a = Message::new();
    many_a.insert("value", Value::UInt(1));
    let mut many_b = Message::new();
    many_b.insert("value", Value::UInt(2));

    let mut outer_msg = Message::new();
    outer_msg.insert("id", Value::UInt(1));
    outer_msg.insert(
        "fixed",
        Value::Numeric(NumericArray::Owned(OwnedNumeric::U8(vec![10, 20, 30]))),
    );
    outer_msg.insert(
        "dynamic",
        Value::Numeric(NumericArray::Owned(OwnedNumeric::U32(vec![1000, 2000]))),
    );
    outer_msg.insert(
        "bounded",
        Value::Numeric(NumericArray::Owned(OwnedNumeric::U8(vec![1, 2]))),
    );
    outer_msg.insert("inner", Value::Struct(Box::new(inner_leaf)));
    outer_msg.insert("boxed", Value::Struct(Box::new(boxed_inner)));
    outer_msg.insert("many", Value::StructArray(vec![many_a, many_b]));
    outer_msg.insert("label", Value::Str("hi".to_string()));
    outer_msg.insert("name", Value::Str("a longer unbounded name".to_string()));

    let record = Record::new(12, Some(3), 42.5, outer_msg);

    let encoded = serialize_message(&schema, &hash_map, &record).unwrap();
    let predicted = serialized_message_size(&schema, &hash_map, &record).unwrap();
    assert_eq!(predicted, encoded.len());

    let decoded = deserialize_message(&schema, &hash_map, &encoded, 0).unwrap();
    assert_eq!(decoded.type_name, "demo::outer");
    assert_eq!(decoded.variant, Some(3));
    assert_eq!(decoded.hash_value, 12);
    assert_eq!(decoded.timestamp, 42.5);

    assert_eq!(decoded.message.get("id"), Some(&Value::UInt(1)));
    assert_eq!(
        decoded.message.get("fixed"),
        Some(&Value::Numeric(NumericArray::Owned(OwnedNumeric::U8(vec![10, 20, 30]))))
    );
    assert_eq!(
        decoded.message.get("dynamic"),
        Some(&Value::Numeric(NumericArray::Owned(OwnedNumeric::U32(vec![1000, 2000]))))
    );
    assert_eq!(
        decoded.message.get("bounded"),
        Some(&Value::Numeric(NumericArray::Owned(OwnedNumeric::U8(vec![1, 2]))))
    );
    assert_eq!(decoded.message.get("label"), Some(&Value::Str("hi".to_string())));
    assert_eq!(
        decoded.message.get("name"),
        Some(&Value::Str("a longer unbounded name".to_string()))
    );

    let Value::Struct(inner) = decoded.message.get("inner").unwrap() else {
        panic!("expected a nested struct value");
    };
    assert_eq!(inner.get("tag"), Some(&Value::UInt(9)));

    let Value::Struct(boxed) = decoded.message.get("boxed").unwrap() else {
        panic!("expected a nested struct value");
    };
    assert_eq!(boxed.get("value"), Some(&Value::UInt(200)));

    let Value::StructArray(many) = decoded.message.get("many").unwrap() else {
        panic!("expected a nested struct array value");
    };
    assert_eq!(many.len(), 2);
    assert_eq!(many[0].get("value"), Some(&Value::UInt(1)));
    assert_eq!(many[1].get("value"), Some(&Value::UInt(2)));

    // re-encoding the decoded record reproduces the same bytes exactly.
    let re_encoded = serialize_message(&schema, &hash_map, &decoded).unwrap();
    assert_eq!(re_encoded, encoded);
}

#[test]
fn numeric_array_equality_ignores_borrowed_vs_owned_representation() {
    let owned = NumericArray::Owned(OwnedNumeric::U16(vec![1, 2, 3]));
    let bytes: Vec<u8> = vec![1, 0, 2, 0, 3, 0];
    let borrowed = NumericArray::Borrowed(crate::value::NumericView::new(NumericKind::U16, &bytes, 3));
    assert_eq!(owned, borrowed);
    assert_eq!(borrowed.get(1), NumericScalar::U(2));
}

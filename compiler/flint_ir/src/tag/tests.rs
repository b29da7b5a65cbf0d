use pretty_assertions::assert_eq;

use super::*;

#[test]
fn plain_tags_split_without_payload() {
    assert_eq!(Tag::split(20), Some((Tag::VariableGet, 0)));
    assert_eq!(Tag::split(2), None);
}

#[test]
fn specialized_int_literal_carries_payload() {
    let byte = Tag::SpecializedIntLiteral.with_payload(5);
    assert_eq!(byte, 0x95);
    assert_eq!(Tag::split(byte), Some((Tag::SpecializedIntLiteral, 5)));
}

#[test]
fn tag_classes_are_disjoint() {
    for byte in 0..=u8::MAX {
        if let Some((tag, _)) = Tag::split(byte) {
            let classes = [tag.is_expression(), tag.is_statement(), tag.is_type()];
            assert!(classes.iter().filter(|c| **c).count() <= 1, "{tag}");
        }
    }
}

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn canonical_ref_null_has_no_index() {
    assert_eq!(CanonicalRef::NULL.index(), None);
    assert!(CanonicalRef::NULL.is_null());
    assert_eq!(CanonicalRef::from_index(4).index(), Some(4));
}

#[test]
fn token_pos_min_max_prefer_real() {
    let a = TokenPos::new(10);
    let b = TokenPos::new(3);
    assert_eq!(a.min_real(b), b);
    assert_eq!(a.max_real(b), a);
    assert_eq!(TokenPos::NO_SOURCE.min_real(a), a);
    assert_eq!(a.max_real(TokenPos::NO_SOURCE), a);
    assert!(!TokenPos::NO_SOURCE.max_real(TokenPos::NO_SOURCE).is_real());
}

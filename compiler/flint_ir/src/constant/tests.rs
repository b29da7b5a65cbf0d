use pretty_assertions::assert_eq;

use super::*;

#[test]
fn sentinels_are_pre_interned() {
    let pool = ConstantPool::new();
    assert_eq!(pool.intern(ConstValue::Null), ConstantPool::NULL);
    assert_eq!(pool.intern(ConstValue::Bool(false)), ConstantPool::FALSE);
    assert_eq!(pool.intern(ConstValue::string("")), ConstantPool::EMPTY_STR);
    assert!(pool.is_empty());
}

#[test]
fn equal_values_share_an_id() {
    let pool = ConstantPool::new();
    let a = pool.intern(ConstValue::Int(7));
    let list = |pool: &ConstantPool| {
        pool.intern(ConstValue::List {
            element: ResolvedType::Dynamic,
            elements: vec![a, ConstantPool::TRUE],
        })
    };
    assert_eq!(list(&pool), list(&pool));
    assert_eq!(pool.get(a), Some(ConstValue::Int(7)));
    assert_ne!(
        pool.intern(ConstValue::double(0.0)),
        pool.intern(ConstValue::double(-0.0))
    );
}

#[test]
fn concurrent_interning_agrees() {
    let pool = ConstantPool::new();
    let ids: Vec<ConstantId> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| pool.intern(ConstValue::string("shared"))))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(ConstantPool::NULL))
            .collect()
    });
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_ne!(ids[0], ConstantPool::NULL);
    assert_eq!(pool.len(), 5);
}

#[test]
fn cache_clear_drops_entries() {
    let cache = ConstantCache::new();
    cache.insert(NodeRef::new(4), ConstantPool::TRUE);
    assert_eq!(cache.get(NodeRef::new(4)), Some(ConstantPool::TRUE));
    cache.clear();
    assert!(cache.is_empty());
}

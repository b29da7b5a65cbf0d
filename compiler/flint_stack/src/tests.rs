use super::*;

#[test]
fn deep_recursion_does_not_overflow() {
    fn nest(n: u64) -> u64 {
        ensure_sufficient_stack(|| if n == 0 { 0 } else { nest(n - 1) + 1 })
    }

    // Deeper than an 8MB default stack allows without growth.
    assert_eq!(nest(100_000), 100_000);
}

#[test]
fn passes_results_through() {
    let result: Result<u8, &str> = ensure_sufficient_stack(|| Err("no"));
    assert_eq!(result, Err("no"));
}

#[test]
fn limit_refuses_past_ceiling() {
    let mut limit = RecursionLimit::new(2);
    assert!(limit.enter());
    assert!(limit.enter());
    assert!(!limit.enter());
    assert_eq!(limit.depth(), 2);
    limit.exit();
    assert!(limit.enter());
}

//! Convergence layer detection.
//!
//! Once a path has changed ASN at least once, the first hop that repeats its
//! predecessor's ASN marks where upstream paths merge into shared
//! infrastructure. That hop and everything after it are dropped.

/// Index of the convergence boundary in a TTL-ordered ASN sequence.
///
/// `[A, B, B, B, C]` → `Some(2)`: the run of B starts at 1, the repeat at 2,
/// and the A→B transition came first. A path that never changes ASN before
/// repeating has no boundary.
pub fn convergence_boundary<T: PartialEq>(asns: &[T]) -> Option<usize> {
    let mut transitioned = false;
    for i in 1..asns.len() {
        if asns[i] == asns[i - 1] {
            if transitioned {
                return Some(i);
            }
        } else {
            transitioned = true;
        }
    }
    None
}

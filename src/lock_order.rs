use crate::account::AccountId;

/// Returns the pair in the global lock acquisition order.
///
/// The order is the raw byte order of the identifiers, which matches the
/// lexicographic order of their hyphenated text form. It ignores which side is
/// the source of a transfer, so A->B and B->A lock the same row first.
pub fn lock_order(a: AccountId, b: AccountId) -> (AccountId, AccountId) {
    if a.as_bytes() <= b.as_bytes() {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> AccountId {
        s.parse().unwrap()
    }

    #[test]
    fn independent_of_argument_order() {
        let low = id("0190f2a0-0000-7000-8000-000000000001");
        let high = id("0190f2a0-0000-7000-8000-00000000000a");
        assert_eq!(lock_order(low, high), (low, high));
        assert_eq!(lock_order(high, low), (low, high));
    }

    #[test]
    fn agrees_with_text_order() {
        let a = id("9f000000-0000-4000-8000-000000000000");
        let b = id("a0000000-0000-4000-8000-000000000000");
        assert!(a.to_string() < b.to_string());
        assert_eq!(lock_order(b, a), (a, b));
    }

    #[test]
    fn equal_ids_stay_put() {
        let a = AccountId::new();
        assert_eq!(lock_order(a, a), (a, a));
    }
}

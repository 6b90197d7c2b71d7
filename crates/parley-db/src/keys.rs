use uuid::Uuid;

/// Canonical key for a two-party conversation: the sorted, de-duplicated
/// participant set joined with `_`. Any ordering of the same set yields
/// the same key, which is what makes 1:1 lookup deterministic.
pub fn canonical_key(participants: &[Uuid]) -> String {
    let mut ids: Vec<String> = participants.iter().map(|id| id.to_string()).collect();
    ids.sort();
    ids.dedup();
    ids.join("_")
}

/// Collapse a participant list (caller included) into a sorted,
/// de-duplicated set.
pub fn participant_set(caller: Uuid, others: &[Uuid]) -> Vec<Uuid> {
    let mut set: Vec<Uuid> = Vec::with_capacity(others.len() + 1);
    set.push(caller);
    set.extend_from_slice(others);
    set.sort();
    set.dedup();
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(canonical_key(&[a, b]), canonical_key(&[b, a]));
    }

    #[test]
    fn key_collapses_duplicates() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(canonical_key(&[a, b, a]), canonical_key(&[a, b]));
    }

    #[test]
    fn participant_set_includes_caller_once() {
        let caller = Uuid::new_v4();
        let other = Uuid::new_v4();
        let set = participant_set(caller, &[other, caller]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&caller));
        assert!(set.contains(&other));
    }
}

//! Label uniquification within one event group.

use std::collections::HashSet;

/// Make every label in an event group unique, in row order.
///
/// The first occurrence of a label keeps it unchanged. Later duplicates get
/// `-N` appended, with `N` counting up from 1 until the candidate has not been
/// seen yet (so a literal `X-1` earlier in the group is skipped over).
pub fn uniquify<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(labels.len());
    let mut unique = Vec::with_capacity(labels.len());

    for label in labels {
        let label = label.as_ref();
        let mut candidate = label.to_string();
        let mut suffix = 1u32;
        while seen.contains(&candidate) {
            candidate = format!("{}-{}", label, suffix);
            suffix += 1;
        }
        seen.insert(candidate.clone());
        unique.push(candidate);
    }

    unique
}

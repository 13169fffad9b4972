//! src/operators/listing_diff.rs
//! ============================================================================
//! # Listing Diff: Index-Stable Insert/Remove Edits Between Two Listings
//!
//! Two passes over the listings, comparing by [`EntryInfo::same_entry`]:
//!
//! 1. Removal, last index to first. Every old entry with no identity match in
//!    the new listing is removed from a working copy; walking backward keeps
//!    the indices of the entries not yet visited valid.
//! 2. Insertion, first index to last. Every new entry with no identity match
//!    in the working copy is inserted into it at its index in the new listing.
//!
//! Applying the edits in emission order to the old listing yields the working
//! copy, whose membership equals the new listing. Both passes are quadratic in
//! the listing size.

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::fs::entry_info::EntryInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Remove { index: usize, entry: EntryInfo },
    Insert { index: usize, entry: EntryInfo },
}

impl Edit {
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Remove { index, .. } | Self::Insert { index, .. } => *index,
        }
    }

    #[must_use]
    pub const fn entry(&self) -> &EntryInfo {
        match self {
            Self::Remove { entry, .. } | Self::Insert { entry, .. } => entry,
        }
    }
}

/// All edits turning `old` into `new`, collected.
#[must_use]
pub fn diff(old: &[EntryInfo], new: &[EntryInfo]) -> Vec<Edit> {
    let mut edits = Vec::new();
    let never = CancellationToken::new();
    let reconciled = diff_streaming(old.to_vec(), new, &never, |edit: Edit| edits.push(edit));
    debug_assert!(reconciled.is_some(), "diff under a fresh token cannot be cancelled");
    edits
}

/// Stream edits to `emit` as they are found.
///
/// Returns the reconciled listing, or `None` when `token` was cancelled
/// before both passes finished. Cancellation is checked before each entry
/// and between the passes; edits already emitted stay emitted.
pub fn diff_streaming<F>(
    old: Vec<EntryInfo>,
    new: &[EntryInfo],
    token: &CancellationToken,
    mut emit: F,
) -> Option<Vec<EntryInfo>>
where
    F: FnMut(Edit),
{
    let mut working: Vec<EntryInfo> = old;
    let mut removed: usize = 0;
    let mut inserted: usize = 0;

    for index in (0..working.len()).rev() {
        if token.is_cancelled() {
            return None;
        }

        let still_present = new.iter().any(|e: &EntryInfo| e.same_entry(&working[index]));
        if !still_present {
            let entry: EntryInfo = working.remove(index);
            trace!(index, name = %entry.name, "diff remove");
            emit(Edit::Remove { index, entry });
            removed += 1;
        }
    }

    if token.is_cancelled() {
        return None;
    }

    for (index, entry) in new.iter().enumerate() {
        if token.is_cancelled() {
            return None;
        }

        let already_there = working.iter().any(|e: &EntryInfo| e.same_entry(entry));
        if !already_there {
            let index = index.min(working.len());
            working.insert(index, entry.clone());
            trace!(index, name = %entry.name, "diff insert");
            emit(Edit::Insert {
                index,
                entry: entry.clone(),
            });
            inserted += 1;
        }
    }

    debug!(removed, inserted, total = working.len(), "Listing diff completed");
    Some(working)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::mock_entry;
    use std::path::PathBuf;

    fn file(name: &str, size: u64) -> EntryInfo {
        mock_entry(&PathBuf::from("/tmp/t").join(name), size, false, false)
    }

    fn apply(mut listing: Vec<EntryInfo>, edits: &[Edit]) -> Vec<EntryInfo> {
        for edit in edits {
            match edit {
                Edit::Remove { index, entry } => {
                    assert!(listing[*index].same_entry(entry));
                    listing.remove(*index);
                }
                Edit::Insert { index, entry } => listing.insert(*index, entry.clone()),
            }
        }
        listing
    }

    fn same_membership(a: &[EntryInfo], b: &[EntryInfo]) -> bool {
        a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.same_entry(y)))
    }

    #[test]
    fn identical_listings_produce_no_edits() {
        let listing = vec![file("a", 1), file("b", 2), file("c", 3)];
        assert!(diff(&listing, &listing).is_empty());
        assert!(diff(&[], &[]).is_empty());
    }

    #[test]
    fn collected_edits_match_streamed_edits() {
        let old = vec![file("a", 1), file("b", 2), file("c", 3)];
        let new = vec![file("b", 2), file("d", 4)];

        let mut streamed = Vec::new();
        let token = CancellationToken::new();
        let reconciled = diff_streaming(old.clone(), &new, &token, |e| streamed.push(e));

        assert_eq!(reconciled, Some(new.clone()));
        assert_eq!(diff(&old, &new), streamed);
    }

    #[test]
    fn single_removal_is_one_edit() {
        let old = vec![file("a", 1), file("b", 2), file("c", 3)];
        let new = vec![file("a", 1), file("c", 3)];

        let edits = diff(&old, &new);
        assert_eq!(edits, vec![Edit::Remove { index: 1, entry: file("b", 2) }]);
    }

    #[test]
    fn changed_size_is_remove_then_insert() {
        let old = vec![file("a", 1), file("b", 2)];
        let new = vec![file("a", 1), file("b", 99)];

        let edits = diff(&old, &new);
        assert_eq!(
            edits,
            vec![
                Edit::Remove { index: 1, entry: file("b", 2) },
                Edit::Insert { index: 1, entry: file("b", 99) },
            ]
        );
    }

    #[test]
    fn applying_edits_reaches_new_membership() {
        let old = vec![file("a", 1), file("b", 2), file("c", 3), file("d", 4), file("e", 5)];
        let new = vec![file("0", 0), file("b", 2), file("bb", 7), file("d", 40), file("f", 6)];

        let edits = diff(&old, &new);
        let result = apply(old, &edits);
        assert!(same_membership(&result, &new));
        assert_eq!(
            result.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            ["0", "b", "bb", "d", "f"]
        );
    }

    #[test]
    fn removals_are_emitted_back_to_front() {
        let old = vec![file("a", 1), file("b", 2), file("c", 3)];
        let new = vec![file("b", 2)];

        let indices: Vec<usize> = diff(&old, &new).iter().map(Edit::index).collect();
        assert_eq!(indices, [2, 0]);
    }

    #[test]
    fn streaming_returns_reconciled_listing() {
        let old = vec![file("a.txt", 10), file("b.txt", 20)];
        let new = vec![file("b.txt", 20), file("c.txt", 15)];

        let mut edits = Vec::new();
        let token = CancellationToken::new();
        let reconciled = diff_streaming(old, &new, &token, |e| edits.push(e)).unwrap();

        assert_eq!(
            edits,
            vec![
                Edit::Remove { index: 0, entry: file("a.txt", 10) },
                Edit::Insert { index: 1, entry: file("c.txt", 15) },
            ]
        );
        assert_eq!(reconciled, new);
    }

    #[test]
    fn cancelled_mid_removal_returns_none() {
        let old = vec![file("a", 1), file("b", 2), file("c", 3)];
        let new = vec![file("x", 9)];
        let token = CancellationToken::new();

        let mut edits = Vec::new();
        let result = diff_streaming(old, &new, &token, |e| {
            edits.push(e);
            token.cancel();
        });

        assert!(result.is_none());
        assert_eq!(edits.len(), 1);
        assert!(matches!(edits[0], Edit::Remove { index: 2, .. }));
    }
}

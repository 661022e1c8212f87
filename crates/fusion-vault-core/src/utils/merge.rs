use std::borrow::Cow;
use std::collections::HashSet;

/// Anything stored in the vault under a stable id. Ids compare by their
/// string form.
pub trait Identified {
    fn id(&self) -> Cow<'_, str>;
}

/// Merge a restored backup into the current list.
///
/// Incoming entries come first and the first occurrence of each id wins, so
/// an imported record replaces an existing one with the same id. Relative
/// order is otherwise preserved: deduplicated incoming items, then the
/// remaining existing items.
pub fn merge_by_id<T: Identified>(incoming: Vec<T>, existing: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    incoming
        .into_iter()
        .chain(existing)
        .filter(|item| seen.insert(item.id().into_owned()))
        .collect()
}

use crate::document::TemplateRecord;
use crate::index::TemplateIndex;
use crate::snapshot::Snapshot;

/// Computes the subset of `current` considered changed relative to the last
/// deployed snapshot: records whose name is new, or whose `spec` payload
/// differs structurally (deep equality, independent of key order).
///
/// With no previous snapshot the whole index is the change set. Records
/// present only in the snapshot are never surfaced: deletion is expressed by
/// an explicit marker inside a surviving record's spec, not inferred from
/// absence.
pub fn compute_change_set<'a>(
    current: &'a TemplateIndex,
    previous: Option<&Snapshot>,
) -> Vec<&'a TemplateRecord> {
    let Some(previous) = previous else {
        return current.records().collect();
    };

    current
        .records()
        .filter(|record| match previous.find(record.name()) {
            None => true,
            Some(old) => old.spec() != record.spec(),
        })
        .collect()
}

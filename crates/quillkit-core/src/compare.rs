//! Cheap state comparison.
//!
//! Everything downstream that is expensive to recompute (schema migration,
//! positioner geometry, view resynchronization) first asks these predicates
//! whether anything actually changed. They lean on the version counters the
//! model maintains instead of diffing trees; the one deep comparison is a
//! tie-break for states whose counters carry no information relative to each
//! other (two independently created states).

use quillkit_model::StatePair;

/// True when document content differs between the two states.
pub fn doc_changed(pair: &StatePair<'_>) -> bool {
    if pair.old.schema().fingerprint() != pair.new.schema().fingerprint() {
        return true;
    }
    if pair.old.doc_version() != pair.new.doc_version() {
        return true;
    }
    // Counters agree: either the same lineage (genuinely unchanged) or two
    // unrelated states, which only a content comparison can distinguish.
    pair.old.doc() != pair.new.doc()
}

/// True when the selection differs between the two states.
pub fn selection_changed(pair: &StatePair<'_>) -> bool {
    pair.old.selection() != pair.new.selection()
}

/// True when anything observable differs between the two states.
pub fn state_changed(pair: &StatePair<'_>) -> bool {
    pair.old.version() != pair.new.version()
        || selection_changed(pair)
        || doc_changed(pair)
}

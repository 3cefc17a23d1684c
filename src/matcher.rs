// =============================================================================
// matcher.rs — WHOSE CNAME IS THIS?
// =============================================================================
//
// Walks the registry in file order and yields every record whose CNAME
// pattern finds a match in the resolved name. The probe then confirms them
// one at a time, and the first confirmation ends the search.
//
// First-match-wins is policy, not an accident: if two providers both claim
// a CNAME, the row higher up in the fingerprint file is tried first. Put the
// specific patterns above the generic ones.
// =============================================================================

use crate::models::ProviderRecord;
use crate::registry::ProviderRegistry;

/// Candidate providers for `cname`, in registry order. No CNAME, no
/// candidates, whatever the patterns would have said about an empty string.
pub fn candidates<'a>(
    cname: Option<&'a str>,
    registry: &'a ProviderRegistry,
) -> impl Iterator<Item = &'a ProviderRecord> + 'a {
    registry
        .records()
        .iter()
        .filter(move |record| match cname {
            Some(name) if !name.is_empty() => record.cname_pattern.is_match(name),
            _ => false,
        })
}

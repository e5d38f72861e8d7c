//! Group-spec text parsing.
//!
//! A group spec is a semicolon-separated list of group keys, each a
//! comma-joined list of channel identifiers: `"1,2; 3,4"` names two
//! coincidence groups, channels 1+2 and channels 3+4. The key strings double
//! as wire identifiers and data-series labels, so they are kept verbatim
//! apart from trimming surrounding whitespace. Channel identifiers are not
//! validated here; the instrument parses them server-side.

/// Parse group-spec text into ordered group keys.
///
/// Empty and whitespace-only segments are discarded, order is preserved, and
/// the result is idempotent: parsing the keys rejoined with `";"` reproduces
/// the same list.
pub fn parse_group_spec(text: &str) -> Vec<String> {
    text.split(';')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether the spec text contains at least one group key.
pub fn has_groups(text: &str) -> bool {
    text.split(';').any(|g| !g.trim().is_empty())
}

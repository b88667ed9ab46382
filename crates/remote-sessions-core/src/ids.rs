//! Session identifier classification.
//!
//! When the remote daemon cannot confirm that a freshly spawned agent has
//! registered its session before its own deadline, it answers with a
//! placeholder derived from the operating-system process number
//! (`pid-<digits>`). Such an identifier must be resolved into the permanent
//! one before it is handed to anything that persists or displays it.

/// Prefix carried by provisional identifiers (matched ASCII case-insensitively).
pub const PROVISIONAL_PREFIX: &str = "pid-";

/// Returns `true` if `id` is a provisional, process-number-derived identifier.
///
/// Only the exact `pid-<digits>` shape qualifies. Permanent identifiers that
/// are numeric-looking (`"1234"`) or merely contain `pid` (`"rapid-1"`,
/// `"pid-12a"`) are permanent.
#[must_use]
pub fn is_provisional(id: &str) -> bool {
    provisional_digits(id).is_some()
}

/// Extract the process number from a provisional identifier.
///
/// Returns `None` for permanent identifiers and for digit runs that do not
/// fit a `u32`.
#[must_use]
pub fn provisional_pid(id: &str) -> Option<u32> {
    provisional_digits(id).and_then(|digits| digits.parse().ok())
}

fn provisional_digits(id: &str) -> Option<&str> {
    let prefix_len = PROVISIONAL_PREFIX.len();
    if id.len() <= prefix_len || !id.is_char_boundary(prefix_len) {
        return None;
    }
    let (prefix, digits) = id.split_at(prefix_len);
    if !prefix.eq_ignore_ascii_case(PROVISIONAL_PREFIX) {
        return None;
    }
    digits
        .bytes()
        .all(|b| b.is_ascii_digit())
        .then_some(digits)
}

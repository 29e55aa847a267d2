//! Relay rotation and contributor masking.
//!
//! At turn `t` of a session currently at turn `c`, participant `i` of an
//! `n`-strong roster reads the turn-`t` contribution of roster position
//! `(i - (c - t)) mod n`. Walking `t` from `c` down to 1 steps one position
//! back around the roster per turn.

/// Character that replaces every masked character of a contributor name.
pub const MASK_FILLER: char = '*';

/// Roster index whose turn-`turn` contribution participant `own_index`
/// reads while the session is at `current_turn`.
///
/// Returns `None` for an empty roster or a turn after `current_turn`.
#[must_use]
pub fn relay_index(
    own_index: usize,
    current_turn: u32,
    turn: u32,
    roster_len: usize,
) -> Option<usize> {
    if roster_len == 0 || turn > current_turn {
        return None;
    }
    let offset = (current_turn - turn) as usize % roster_len;
    Some((own_index % roster_len + roster_len - offset) % roster_len)
}

/// The relay for `name`: for each turn `1..=current_turn`, the roster member
/// whose contribution `name` reads. Empty if `name` is not in the roster.
#[must_use]
pub fn relay_contributors<'a>(
    roster: &'a [String],
    name: &str,
    current_turn: u32,
) -> Vec<(u32, &'a str)> {
    let Some(own_index) = roster.iter().position(|member| member == name) else {
        return Vec::new();
    };
    (1..=current_turn)
        .filter_map(|turn| {
            relay_index(own_index, current_turn, turn, roster.len())
                .map(|index| (turn, roster[index].as_str()))
        })
        .collect()
}

/// Keeps the first character of `name` and replaces the rest with
/// [`MASK_FILLER`]. Names of one character or less are returned unchanged.
#[must_use]
pub fn mask_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => std::iter::once(first)
            .chain(chars.map(|_| MASK_FILLER))
            .collect(),
        None => String::new(),
    }
}

//! `matchesPattern` (§4.5): the filter behind every name-based query.

/// Matches `input` against `pattern` per the rules in §4.5:
/// - `ignore_case` folds both strings to ASCII lowercase before comparing.
/// - `subsequence=false` is a substring match; `anchor_start` requires the
///   match to begin at index 0, `anchor_end` requires it to end at
///   `input.len()`.
/// - `subsequence=true` requires the characters of `pattern` to appear in
///   order (not necessarily contiguously) in `input`, optionally anchored
///   at the start and/or end.
pub fn matches_pattern(
    input: &str,
    pattern: &str,
    anchor_start: bool,
    anchor_end: bool,
    subsequence: bool,
    ignore_case: bool,
) -> bool {
    let folded_input;
    let folded_pattern;
    let (input, pattern) = if ignore_case {
        folded_input = input.to_ascii_lowercase();
        folded_pattern = pattern.to_ascii_lowercase();
        (folded_input.as_str(), folded_pattern.as_str())
    } else {
        (input, pattern)
    };

    if subsequence {
        matches_subsequence(input, pattern, anchor_start, anchor_end)
    } else {
        matches_substring(input, pattern, anchor_start, anchor_end)
    }
}

fn matches_substring(input: &str, pattern: &str, anchor_start: bool, anchor_end: bool) -> bool {
    if anchor_start && anchor_end {
        return input == pattern;
    }
    if anchor_start {
        return input.starts_with(pattern);
    }
    if anchor_end {
        return input.ends_with(pattern);
    }
    input.contains(pattern)
}

fn matches_subsequence(input: &str, pattern: &str, anchor_start: bool, anchor_end: bool) -> bool {
    if pattern.is_empty() {
        return true;
    }

    let input_chars: Vec<char> = input.chars().collect();
    let pattern_chars: Vec<char> = pattern.chars().collect();

    let Some(start) = find_subsequence_start(&input_chars, &pattern_chars) else { return false };

    if anchor_start && start != 0 {
        return false;
    }

    if anchor_end {
        // An anchored-end subsequence match must be able to consume the
        // pattern using the *last* occurrence of its final character.
        return find_subsequence_end(&input_chars, &pattern_chars);
    }

    true
}

/// Returns the index of the first input character consumed by a greedy
/// left-to-right subsequence match, or `None` if no match exists.
fn find_subsequence_start(input: &[char], pattern: &[char]) -> Option<usize> {
    let mut pat_iter = pattern.iter().peekable();
    let mut first_index = None;
    for (i, ch) in input.iter().enumerate() {
        if let Some(&&next) = pat_iter.peek() {
            if *ch == next {
                if first_index.is_none() {
                    first_index = Some(i);
                }
                pat_iter.next();
            }
        } else {
            break;
        }
    }
    if pat_iter.peek().is_none() { first_index } else { None }
}

/// Checks whether the pattern can be matched as a subsequence ending
/// exactly at the last character of `input`, by consuming input
/// right-to-left.
fn find_subsequence_end(input: &[char], pattern: &[char]) -> bool {
    let mut pat_iter = pattern.iter().rev().peekable();
    for ch in input.iter().rev() {
        if let Some(&&next) = pat_iter.peek() {
            if *ch == next {
                pat_iter.next();
            }
        } else {
            break;
        }
    }
    pat_iter.peek().is_none()
}

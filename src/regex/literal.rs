//! Tier 3 accelerator (spec §4.5 "Literal prefilter"): a prefix, a suffix,
//! and a set of required substrings extracted from a pattern, used to reject
//! non-matching inputs without invoking the full engine.

#[derive(Debug, Clone, Default)]
pub struct LiteralInfo {
    prefix: Option<Vec<u8>>,
    suffix: Option<Vec<u8>>,
    required: Vec<Vec<u8>>,
}

const MIN_REQUIRED_LEN: usize = 3;

impl LiteralInfo {
    /// Builds prefilter info for `pattern`. Never refuses outright (an empty
    /// `LiteralInfo` simply never rejects anything), but top-level
    /// alternation suppresses required-substring extraction (spec §4.5).
    pub fn build(pattern: &[u8]) -> Self {
        let has_alternation = contains_top_level_alternation(pattern);

        let prefix = if pattern.first() == Some(&b'^') {
            extract_literal_run(&pattern[1..])
        } else {
            None
        };

        let suffix = if pattern.last() == Some(&b'$') && !escaped_dollar(pattern) {
            let body = &pattern[..pattern.len() - 1];
            extract_literal_run_from_end(body)
        } else {
            None
        };

        let required = if has_alternation {
            Vec::new()
        } else {
            extract_required_substrings(pattern)
        };

        LiteralInfo { prefix, suffix, required }
    }

    /// Quickly returns `true` when `s` is provably not a match. Zero
    /// allocation: every check walks `s` directly.
    pub fn can_reject(&self, s: &[u8]) -> bool {
        if let Some(p) = &self.prefix {
            if !s.starts_with(p.as_slice()) {
                return true;
            }
        }
        if let Some(suf) = &self.suffix {
            if !s.ends_with(suf.as_slice()) {
                return true;
            }
        }
        for req in &self.required {
            if !contains(s, req) {
                return true;
            }
        }
        false
    }
}

fn contains_top_level_alternation(pattern: &[u8]) -> bool {
    let mut i = 0;
    while i < pattern.len() {
        match pattern[i] {
            b'\\' => i += 1,
            b'|' => return true,
            _ => {}
        }
        i += 1;
    }
    false
}

fn escaped_dollar(pattern: &[u8]) -> bool {
    pattern.len() >= 2 && pattern[pattern.len() - 2] == b'\\'
}

fn is_meta(b: u8) -> bool {
    matches!(b, b'.' | b'*' | b'+' | b'?' | b'(' | b')' | b'[' | b']' | b'{' | b'}' | b'|' | b'^' | b'$' | b'\\')
}

/// A maximal run of plain literal bytes from the start of `body`. A
/// trailing `*`/`?`/`{` quantifies (and so makes optional) the last byte
/// pushed, which must then not be treated as a guaranteed prefix byte.
fn extract_literal_run(body: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    for &b in body {
        if is_meta(b) {
            if matches!(b, b'*' | b'?' | b'{') {
                out.pop();
            }
            break;
        }
        out.push(b);
    }
    if out.is_empty() { None } else { Some(out) }
}

fn extract_literal_run_from_end(body: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    for &b in body.iter().rev() {
        if is_meta(b) {
            break;
        }
        out.push(b);
    }
    out.reverse();
    if out.is_empty() { None } else { Some(out) }
}

/// Extracts literal runs of length >= 3 that sit outside bracket classes and
/// parenthesized groups — each one is necessarily present in any match.
fn extract_required_substrings(pattern: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut run = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < pattern.len() {
        match pattern[i] {
            b'\\' => {
                flush_run(&mut run, &mut out);
                i += 2;
                continue;
            }
            b'(' => {
                depth += 1;
                flush_run(&mut run, &mut out);
            }
            b')' => {
                depth = depth.saturating_sub(1);
                flush_run(&mut run, &mut out);
            }
            b'[' => {
                flush_run(&mut run, &mut out);
                if let Some(close) = pattern[i..].iter().position(|&b| b == b']') {
                    i += close + 1;
                    continue;
                } else {
                    break;
                }
            }
            // `*`/`?`/`{` quantify the char they directly follow, making it
            // optional (0 occurrences is legal) — that char must not be
            // treated as required. `+` guarantees >=1 occurrence, so the
            // preceding char stays required.
            b'*' | b'?' | b'{' => {
                run.pop();
                flush_run(&mut run, &mut out);
            }
            b'.' | b'+' | b'^' | b'$' | b'}' | b'|' => {
                flush_run(&mut run, &mut out);
            }
            b if depth == 0 => run.push(b),
            _ => flush_run(&mut run, &mut out),
        }
        i += 1;
    }
    flush_run(&mut run, &mut out);
    out
}

fn flush_run(run: &mut Vec<u8>, out: &mut Vec<Vec<u8>>) {
    if run.len() >= MIN_REQUIRED_LEN {
        out.push(run.clone());
    }
    run.clear();
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return needle.is_empty();
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchored_prefix_rejects_non_prefix_input() {
        let info = LiteralInfo::build(b"^/api/v1/");
        assert!(info.can_reject(b"/api/v2/"));
        assert!(!info.can_reject(b"/api/v1/users"));
    }

    #[test]
    fn alternation_suppresses_required_substrings() {
        let info = LiteralInfo::build(b"foo|bar");
        assert!(!info.can_reject(b"quux"));
    }

    #[test]
    fn anchored_suffix_rejects_non_suffix_input() {
        let info = LiteralInfo::build(b"^error.*failed$");
        assert!(!info.can_reject(b"error: operation failed"));
        assert!(info.can_reject(b"operation succeeded"));
    }

    #[test]
    fn anchored_prefix_optional_char_is_not_required() {
        let info = LiteralInfo::build(b"^colou?r");
        assert!(!info.can_reject(b"color here"));
        assert!(!info.can_reject(b"colour here"));
    }

    #[test]
    fn optional_char_is_not_required() {
        // `u?` makes the `u` optional, so "color" (zero `u`) must not be
        // rejected even though "colour" is also a match.
        let info = LiteralInfo::build(b"colou?r");
        assert!(!info.can_reject(b"color"));
        assert!(!info.can_reject(b"colour"));
    }
}

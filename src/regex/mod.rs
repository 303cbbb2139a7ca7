//! Tiered regex runtime (spec §4.5): a handful of fast paths recognized at
//! compile time, falling through to the `regex` crate's byte-oriented engine
//! when no accelerator applies. Matching is byte-oriented throughout — no
//! Unicode awareness (spec.md §1 Non-goals).

pub mod cache;
pub mod char_class;
pub mod composite;
pub mod literal;

use char_class::CharClassAccel;
use composite::CompositeAccel;
use literal::LiteralInfo;

pub use cache::{CacheStats, RegexCache};

/// Which fast path a pattern is eligible for, decided by pure syntactic
/// analysis. The compiler uses this at compile time to precompute pattern
/// fast-path feasibility (spec §2) without building a full `Regex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceleratorKind {
    CharClass,
    Composite,
    None,
}

/// Classifies `pattern` without compiling it. Cheap enough to call once per
/// regex literal during compilation.
pub fn classify_accelerator(pattern: &str) -> AcceleratorKind {
    let bytes = pattern.as_bytes();
    if CharClassAccel::try_build(bytes).is_some() {
        AcceleratorKind::CharClass
    } else if CompositeAccel::try_build(bytes).is_some() {
        AcceleratorKind::Composite
    } else {
        AcceleratorKind::None
    }
}

/// Wraps a full-engine compile failure. A separate type from `CompileError`
/// since a bad regex literal is a user-source error discovered lazily (at
/// pattern-compile time), not one of the compiler's own invariant failures.
#[derive(Debug, thiserror::Error)]
#[error("invalid regex pattern `{pattern}`: {source}")]
pub struct RegexCompileError {
    pattern: String,
    #[source]
    source: regex::Error,
}

enum Accel {
    CharClass(CharClassAccel),
    Composite(CompositeAccel),
}

impl Accel {
    fn find(&self, s: &[u8]) -> Option<(usize, usize)> {
        match self {
            Accel::CharClass(a) => a.find(s),
            Accel::Composite(a) => a.find(s),
        }
    }
}

/// A compiled pattern. Carries at most one accelerator; the literal
/// prefilter and the full `regex::bytes::Regex` engine are always present as
/// the fallback path (spec §4.5 tiers 3 and 4).
pub struct Regex {
    source: String,
    accel: Option<Accel>,
    literal: LiteralInfo,
    engine: regex::bytes::Regex,
}

impl Regex {
    /// Compiles `pattern`, choosing the best available fast path.
    ///
    /// Patterns reaching this point are expected to have already been
    /// validated as syntactically legal regexes during parsing; an invalid
    /// pattern here is an internal invariant failure, not user error.
    pub fn compile(pattern: &str) -> Self {
        Self::try_compile(pattern).expect("regex pattern should have been validated before compilation")
    }

    pub fn try_compile(pattern: &str) -> Result<Self, RegexCompileError> {
        let bytes = pattern.as_bytes();
        let accel = CharClassAccel::try_build(bytes)
            .map(Accel::CharClass)
            .or_else(|| CompositeAccel::try_build(bytes).map(Accel::Composite));
        let literal = LiteralInfo::build(bytes);
        let engine = regex::bytes::RegexBuilder::new(pattern)
            .dot_matches_new_line(true)
            .build()
            .map_err(|source| RegexCompileError {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Regex {
            source: pattern.to_string(),
            accel,
            literal,
            engine,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, s: &[u8]) -> bool {
        self.find(s).is_some()
    }

    pub fn find(&self, s: &[u8]) -> Option<(usize, usize)> {
        if let Some(accel) = &self.accel {
            return accel.find(s);
        }
        if self.literal.can_reject(s) {
            return None;
        }
        self.engine.find(s).map(|m| (m.start(), m.end()))
    }

    /// Always goes through the full engine (spec §4.5): the accelerator
    /// tiers only cover single-match `find`/`is_match` queries, so
    /// multi-match scans stay on the one path whose semantics (overlap
    /// handling, `\s`-class membership, etc.) are guaranteed sound.
    pub fn find_all(&self, s: &[u8]) -> Vec<(usize, usize)> {
        if self.literal.can_reject(s) {
            return Vec::new();
        }
        self.engine
            .find_iter(s)
            .map(|m| (m.start(), m.end()))
            .collect()
    }

    /// Replaces every match with `replacement`, which may contain
    /// `regex`-crate capture-group references (`$1`, `${name}`).
    pub fn replace_all(&self, s: &[u8], replacement: &[u8]) -> Vec<u8> {
        if self.literal.can_reject(s) {
            return s.to_vec();
        }
        self.engine.replace_all(s, replacement).into_owned()
    }

    pub fn replace_all_fn(&self, s: &[u8], mut f: impl FnMut(&[u8]) -> Vec<u8>) -> Vec<u8> {
        let matches = self.find_all(s);
        if matches.is_empty() {
            return s.to_vec();
        }
        let mut out = Vec::with_capacity(s.len());
        let mut last = 0;
        for (start, end) in matches {
            out.extend_from_slice(&s[last..start]);
            out.extend_from_slice(&f(&s[start..end]));
            last = end;
        }
        out.extend_from_slice(&s[last..]);
        out
    }

    pub fn split(&self, s: &[u8]) -> Vec<Vec<u8>> {
        let matches = self.find_all(s);
        if matches.is_empty() {
            return vec![s.to_vec()];
        }
        let mut out = Vec::with_capacity(matches.len() + 1);
        let mut last = 0;
        for (start, end) in matches {
            out.push(s[last..start].to_vec());
            last = end;
        }
        out.push(s[last..].to_vec());
        out
    }
}

impl std::fmt::Debug for Regex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Regex").field("source", &self.source).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_class_accelerator_is_used() {
        assert_eq!(classify_accelerator(r"\d+"), AcceleratorKind::CharClass);
    }

    #[test]
    fn composite_accelerator_is_used() {
        assert_eq!(classify_accelerator("[a-zA-Z]+[0-9]+"), AcceleratorKind::Composite);
    }

    #[test]
    fn s7_anchored_pattern_falls_through_to_full_engine() {
        // `^error.*failed$` is refused by the composite tier (a `*` class
        // directly followed by a literal), so it must still match via the
        // literal-prefilter + full-engine fallback.
        assert_eq!(classify_accelerator("^error.*failed$"), AcceleratorKind::None);
        let re = Regex::compile("^error.*failed$");
        assert!(re.is_match(b"error: disk write failed"));
        assert!(!re.is_match(b"all good"));
    }

    #[test]
    fn find_all_collects_non_overlapping_matches() {
        let re = Regex::compile(r"\d+");
        assert_eq!(re.find_all(b"a1 bb22 c333"), vec![(1, 2), (5, 7), (9, 12)]);
    }

    #[test]
    fn replace_all_substitutes_every_match() {
        let re = Regex::compile(r"\d+");
        assert_eq!(re.replace_all(b"a1 b22", b"#"), b"a# b#".to_vec());
    }

    #[test]
    fn split_breaks_on_every_match() {
        let re = Regex::compile(r"\s+");
        assert_eq!(re.split(b"a  b c"), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn vertical_tab_is_whitespace_like_the_full_engine() {
        // 0x0B (vertical tab) is part of Perl's `\s` class; the char-class
        // fast path must agree with the full engine on it.
        assert_eq!(classify_accelerator(r"\s+"), AcceleratorKind::CharClass);
        let re = Regex::compile(r"\s+");
        assert!(re.is_match(b"a\x0bb"));
    }
}

//! Shared configuration and diagnostic plumbing threaded through `compile()`
//! (SPEC §B "Configuration"), mirroring the way the teacher threads a
//! `TypeManager`/arena reference through its compiler constructor rather than
//! relying on globals or environment lookups.

/// Leftmost-longest (POSIX, AWK's default) vs leftmost-first (Perl-style)
/// regex disambiguation, reifying spec.md §4.5's "fast/Perl mode toggle
/// (leftmost-first) may be offered" into an actual switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegexMode {
    PosixLongest,
    PerlFirst,
}

impl Default for RegexMode {
    fn default() -> Self {
        RegexMode::PosixLongest
    }
}

/// Compiler-wide configuration. Dead-code-eliding / source-level-optimization
/// knobs are deliberately absent: spec.md §1 names those a Non-goal.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    pub regex_mode: RegexMode,
    /// Capacity of the regex compiled-pattern cache the VM/embedder
    /// constructs from `Program.regexes` (spec §4.5, default 100).
    pub regex_cache_capacity: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            regex_mode: RegexMode::default(),
            regex_cache_capacity: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = CompilerOptions::default();
        assert_eq!(opts.regex_mode, RegexMode::PosixLongest);
        assert_eq!(opts.regex_cache_capacity, 100);
    }
}

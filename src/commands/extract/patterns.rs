use regex::RegexBuilder;

/// Explicit statements that a report carries no reserve estimate. A hit
/// turns a persistently empty reserves section into an "explicitly
/// absent" warning instead of a silent miss.
pub const NO_RESERVES_PATTERNS: &[&str] = &[
    r"no\s+(?:current\s+)?mineral\s+reserves?",
    r"no\s+reserves?\s+conforming",
    r"no\s+reserves?\s+(?:have\s+been\s+)?estimated",
    r"no\s+reserve\s+estimates",
    r"no\s+mineral\s+resource\s+or\s+mineral\s+reserve",
    r"no\s+reserves?\s+reported",
];

pub const NO_ECONOMICS_PATTERNS: &[&str] = &[
    r"capital\s+and\s+operating\s+costs?[^.]{0,80}?\bnot\b[^.]{0,80}?determined",
    r"capital\s+costs?[^.]{0,80}?\bnot\b[^.]{0,80}?determined",
    r"operating\s+costs?[^.]{0,80}?\bnot\b[^.]{0,80}?determined",
    r"not\s+at\s+a\s+state\s+where[^.]{0,120}?costs\s+are\s+determined",
    r"no\s+economic\s+(?:analysis|assessment|study)",
    r"economic\s+(?:analysis|assessment|study)\s+has\s+not\s+been\s+completed",
];

/// Returns the 1-based page numbers on which any pattern matches.
pub fn find_pages_with_patterns(pages: &[String], patterns: &[&str]) -> Vec<usize> {
    let compiled: Vec<_> = patterns
        .iter()
        .filter_map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .ok()
        })
        .collect();

    let mut hits = Vec::<usize>::new();
    for (idx, text) in pages.iter().enumerate() {
        if compiled.iter().any(|pattern| pattern.is_match(text)) {
            hits.push(idx + 1);
        }
    }
    hits
}

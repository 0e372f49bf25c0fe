/// Turns note titles into safe, portable file stems.
///
/// Stems are lowercase, use hyphens for whitespace and for characters that
/// are unsafe in paths or meaningful in wikilinks, and never start or end
/// with a hyphen or dot.
pub struct FilenameNormalizer;

/// Used when a title normalizes to nothing.
pub const EMPTY_STEM: &str = "untitled";

impl FilenameNormalizer {
    /// Normalizes a title to a file stem of at most `max_len` characters.
    ///
    /// # Normalization rules
    ///
    /// - Converts to lowercase
    /// - Replaces whitespace, control characters, and `/\:*?"<>|#^[]%` with hyphens
    /// - Collapses consecutive hyphens
    /// - Trims leading/trailing hyphens and dots
    /// - Truncates to `max_len` characters, then re-trims
    ///
    /// # Examples
    ///
    /// ```
    /// use roam2md::paths::FilenameNormalizer;
    ///
    /// assert_eq!(FilenameNormalizer::normalize("Project Plan", 80), "project-plan");
    /// assert_eq!(FilenameNormalizer::normalize("a/b: c?", 80), "a-b-c");
    /// assert_eq!(FilenameNormalizer::normalize("Über Straße", 80), "über-straße");
    /// assert_eq!(FilenameNormalizer::normalize("???", 80), "untitled");
    /// ```
    #[must_use]
    pub fn normalize(title: &str, max_len: usize) -> String {
        let replaced: String = title
            .to_lowercase()
            .chars()
            .map(|c| if is_unsafe(c) { '-' } else { c })
            .collect();

        // Collapse consecutive hyphens into a single hyphen
        let collapsed = replaced
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-");

        let trimmed = trim_edges(&collapsed);
        let bounded: String = trimmed.chars().take(max_len.max(1)).collect();
        let bounded = trim_edges(&bounded);

        if bounded.is_empty() {
            EMPTY_STEM.to_string()
        } else {
            bounded.to_string()
        }
    }
}

fn is_unsafe(c: char) -> bool {
    c.is_whitespace()
        || c.is_control()
        || matches!(
            c,
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' | '^' | '[' | ']' | '%'
        )
}

fn trim_edges(s: &str) -> &str {
    s.trim_matches(|c: char| c == '-' || c == '.' || c.is_whitespace())
}

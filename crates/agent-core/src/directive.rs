//! Directive extraction from model output.
//!
//! The model requests local operations by embedding `<tool>name:argument</tool>`
//! spans in its reply. [`parse`] strips every complete span and returns the
//! directives in the order they appeared. It never executes anything.

/// Opening marker of a directive span.
pub const OPEN: &str = "<tool>";
/// Closing marker of a directive span.
pub const CLOSE: &str = "</tool>";
/// Separator between the operation name and its argument.
pub const NAME_SEPARATOR: char = ':';
/// Separator between fields of multi-part arguments (`path|||content`).
pub const FIELD_SEPARATOR: &str = "|||";

/// One requested operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Operation name, trimmed.
    pub name: String,
    /// Raw argument, trimmed. Interpretation belongs to the operation.
    pub argument: String,
}

impl Directive {
    /// Build a directive from a name and an argument.
    pub fn new(name: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            argument: argument.into(),
        }
    }

    /// Split a directive body on the first separator.
    fn from_body(body: &str) -> Self {
        match body.split_once(NAME_SEPARATOR) {
            Some((name, argument)) => Self::new(name.trim(), argument.trim()),
            None => Self::new(body.trim(), ""),
        }
    }
}

/// Result of scanning one model turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Text with every complete directive span removed.
    pub visible: String,
    /// Directives in left-to-right order.
    pub directives: Vec<Directive>,
}

impl ParsedResponse {
    /// Whether the turn requested any operation.
    #[must_use]
    pub fn has_directives(&self) -> bool {
        !self.directives.is_empty()
    }
}

/// Scan `text` for directive spans.
///
/// An opening marker without a matching close stops the scan; everything from
/// that marker on is kept verbatim. Input without any complete span comes back
/// unchanged.
#[must_use]
pub fn parse(text: &str) -> ParsedResponse {
    let mut visible = String::with_capacity(text.len());
    let mut directives = Vec::new();
    let mut rest = text;

    loop {
        let Some(start) = rest.find(OPEN) else {
            visible.push_str(rest);
            break;
        };
        let body_start = start + OPEN.len();
        let Some(body_len) = rest[body_start..].find(CLOSE) else {
            visible.push_str(rest);
            break;
        };

        visible.push_str(&rest[..start]);
        directives.push(Directive::from_body(&rest[body_start..body_start + body_len]));
        rest = &rest[body_start + body_len + CLOSE.len()..];
    }

    if directives.is_empty() {
        return ParsedResponse {
            visible: text.to_string(),
            directives,
        };
    }

    ParsedResponse {
        visible: visible.trim().to_string(),
        directives,
    }
}

/// Split a multi-field argument into at most `n` parts on [`FIELD_SEPARATOR`].
///
/// Returns `None` when fewer than `n` fields are present.
#[must_use]
pub fn split_fields(argument: &str, n: usize) -> Option<Vec<&str>> {
    let parts: Vec<&str> = argument.splitn(n, FIELD_SEPARATOR).collect();
    (parts.len() == n).then_some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_unchanged() {
        let text = "  Nothing to do here.\n";
        let parsed = parse(text);
        assert_eq!(parsed.visible, text);
        assert!(parsed.directives.is_empty());
    }

    #[test]
    fn extracts_single_directive() {
        let parsed = parse("Let me look. <tool>read:src/main.rs</tool>");
        assert_eq!(parsed.visible, "Let me look.");
        assert_eq!(parsed.directives, vec![Directive::new("read", "src/main.rs")]);
    }

    #[test]
    fn preserves_left_to_right_order() {
        let parsed = parse(
            "<tool>write:a.txt|||hi</tool> then <tool>read:a.txt</tool> and <tool>ls</tool>",
        );
        let names: Vec<_> = parsed.directives.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["write", "read", "ls"]);
        assert_eq!(parsed.visible, "then  and");
        assert!(!parsed.visible.contains(OPEN));
        assert!(!parsed.visible.contains(CLOSE));
    }

    #[test]
    fn splits_on_first_colon_only() {
        let parsed = parse("<tool>remember: editor : helix</tool>");
        assert_eq!(parsed.directives[0].name, "remember");
        assert_eq!(parsed.directives[0].argument, "editor : helix");
    }

    #[test]
    fn missing_separator_gives_empty_argument() {
        let parsed = parse("<tool> tree </tool>");
        assert_eq!(parsed.directives, vec![Directive::new("tree", "")]);
    }

    #[test]
    fn unterminated_marker_is_left_alone() {
        let text = "Working on it <tool>run:ls -la";
        let parsed = parse(text);
        assert_eq!(parsed.visible, text);
        assert!(parsed.directives.is_empty());
    }

    #[test]
    fn unterminated_marker_after_complete_span_is_kept() {
        let parsed = parse("<tool>ls:.</tool> done <tool>run:rm");
        assert_eq!(parsed.directives.len(), 1);
        assert_eq!(parsed.visible, "done <tool>run:rm");
    }

    #[test]
    fn close_marker_without_open_is_plain_text() {
        let text = "stray </tool> marker";
        assert_eq!(parse(text).visible, text);
    }

    #[test]
    fn multiline_arguments_survive() {
        let parsed = parse("<tool>write:notes.md|||line one\nline two</tool>");
        assert_eq!(parsed.directives[0].argument, "notes.md|||line one\nline two");
    }

    #[test]
    fn split_fields_requires_enough_parts() {
        assert_eq!(split_fields("a|||b", 2), Some(vec!["a", "b"]));
        assert_eq!(split_fields("a|||b|||c|||d", 3), Some(vec!["a", "b", "c|||d"]));
        assert_eq!(split_fields("just-a-path", 2), None);
    }
}

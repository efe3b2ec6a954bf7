//! Whole-table scanning and rendering.

use tracing::debug;

use crate::error::ParseError;
use crate::line::ScheduleLine;

/// Parse every entry of a table, dropping blank, comment and malformed lines.
pub fn parse_table(text: &str) -> Vec<ScheduleLine> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, raw)| match ScheduleLine::parse(raw) {
            Ok(line) => Some(line),
            Err(ParseError::EmptyInput | ParseError::CommentLine) => None,
            Err(e) => {
                debug!(line = idx + 1, "Skipping unparsable table line: {e}");
                None
            }
        })
        .collect()
}

/// One entry per line, each terminated by `\n`.
pub fn render_table(lines: &[ScheduleLine]) -> String {
    lines.iter().map(|line| format!("{line}\n")).collect()
}

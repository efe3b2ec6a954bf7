//! Full schedule-table lines: an expression followed by a command.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::expression::{FIELD_COUNT, ScheduleExpression};

/// One entry of the system schedule table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleLine {
    expression: ScheduleExpression,
    /// Everything after the five fields, with its internal spacing intact.
    command: String,
}

impl ScheduleLine {
    /// Pair an expression with a command. The command must not be blank.
    pub fn new(expression: ScheduleExpression, command: impl Into<String>) -> Result<Self, ParseError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(ParseError::InvalidFormat("command is empty".into()));
        }
        Ok(Self {
            expression,
            command,
        })
    }

    /// Parse a table line such as `0 9 * * * /usr/local/bin/backup.sh >> /tmp/b.log`.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(ParseError::EmptyInput);
        }
        if trimmed.starts_with('#') {
            return Err(ParseError::CommentLine);
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().take(FIELD_COUNT + 1).collect();
        if tokens.len() <= FIELD_COUNT {
            return Err(ParseError::InvalidFormat(format!(
                "expected {FIELD_COUNT} fields and a command, found {} tokens",
                tokens.len()
            )));
        }

        let expression = ScheduleExpression::parse(&tokens[..FIELD_COUNT].join(" "))?;
        let command = skip_fields(trimmed, FIELD_COUNT).to_string();
        Ok(Self {
            expression,
            command,
        })
    }

    pub fn expression(&self) -> &ScheduleExpression {
        &self.expression
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// The program the command invokes: its first token.
    pub fn script_path(&self) -> &str {
        self.command.split_whitespace().next().unwrap_or_default()
    }

    /// Target of the first `>` or `>>` redirection in the command.
    ///
    /// Only a standalone operator token counts, so `2>&1` or `>file` never
    /// produce a log path.
    pub fn log_path(&self) -> Option<&str> {
        let mut tokens = self.command.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == ">>" || token == ">" {
                return tokens.next();
            }
        }
        None
    }
}

impl fmt::Display for ScheduleLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expression, self.command)
    }
}

impl FromStr for ScheduleLine {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Remainder of `line` after `count` whitespace-delimited fields and the
/// whitespace that follows them.
fn skip_fields(line: &str, count: usize) -> &str {
    let mut rest = line;
    for _ in 0..count {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = &rest[end..];
    }
    rest.trim_start()
}

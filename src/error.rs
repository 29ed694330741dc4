// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Huang Rui <vowstar@gmail.com>

//! Error type shared by the compositor, the mark subsystem and the
//! persistence helpers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("no window with index {0}")]
    NoWindow(usize),

    #[error("window table is full ({0} windows open)")]
    WindowLimit(usize),

    #[error("the main window cannot be closed")]
    MainWindow,

    #[error("transform stack overflow at depth {0}, hierarchy is too deep or recursive")]
    DepthOverflow(usize),

    /// The requested area does not intersect anything that can be drawn.
    /// This is an expected empty result rather than a fault.
    #[error("requested area does not intersect the source")]
    NoIntersection,

    #[error("bad {field} in \"{line}\"")]
    Parse { field: &'static str, line: String },

    #[error("bad mark file header: \"{0}\"")]
    BadHeader(String),

    #[error("unknown cell {0}")]
    UnknownCell(String),

    #[error("invalid database input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DisplayError {
    pub(crate) fn parse(field: &'static str, line: &str) -> Self {
        DisplayError::Parse {
            field,
            line: line.trim().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DisplayError>;

/// Accumulates non-fatal diagnostics produced while reading persisted
/// state, so a caller can show them after the load completes.
#[derive(Debug, Default, Clone)]
pub struct ErrorLog {
    messages: Vec<String>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: &DisplayError) {
        log::warn!("{err}");
        self.messages.push(err.to_string());
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

//! Where statement text comes from.
//!
//! The pipeline never touches a terminal itself; it pulls whole lines from
//! a [`LineSource`] and tokenizes them on its own.

use std::io::BufRead;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

pub trait LineSource {
    /// The next line of input; `None` means the source is exhausted.
    fn next_line(&mut self) -> Option<String>;
}

impl LineSource for Box<dyn LineSource> {
    fn next_line(&mut self) -> Option<String> {
        (**self).next_line()
    }
}

/// Lines from any buffered reader: a script file, a pipe, or an in-memory
/// cursor in tests.
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: BufRead> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        ReaderSource { reader }
    }
}

impl<R: BufRead> LineSource for ReaderSource<R> {
    fn next_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(err) => {
                tracing::error!("failed to read input: {}", err);
                None
            }
        }
    }
}

/// Interactive lines from a rustyline editor, with history. Ctrl-C and
/// Ctrl-D both end the session.
pub struct PromptSource {
    editor: DefaultEditor,
    prompt: &'static str,
}

impl PromptSource {
    pub fn new(prompt: &'static str) -> rustyline::Result<Self> {
        Ok(PromptSource {
            editor: DefaultEditor::new()?,
            prompt,
        })
    }
}

impl LineSource for PromptSource {
    fn next_line(&mut self) -> Option<String> {
        match self.editor.readline(self.prompt) {
            Ok(line) => {
                let _ = self.editor.add_history_entry(&line);
                Some(line)
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => None,
            Err(err) => {
                tracing::error!("readline failed: {}", err);
                None
            }
        }
    }
}

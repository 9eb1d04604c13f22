use std::fmt;

use rustyline::{
    self,
    completion::{Completer, FilenameCompleter, Pair},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    history::{DefaultHistory, History},
    validate::Validator,
    CompletionType, Config, Helper,
};

use crate::errors::Result;

struct EditorHelper(FilenameCompleter);

impl Completer for EditorHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &rustyline::Context<'_>,
    ) -> ::std::result::Result<(usize, Vec<Pair>), ReadlineError> {
        self.0.complete(line, pos, ctx)
    }
}

impl Hinter for EditorHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        None
    }
}

impl Highlighter for EditorHelper {}

impl Helper for EditorHelper {}

impl Validator for EditorHelper {}

/// Line editor for the interactive prompt, with filename completion and an
/// in-memory command history that is never written to disk.
pub struct Editor {
    internal: rustyline::Editor<EditorHelper, DefaultHistory>,
    history_capacity: usize,
}

impl Editor {
    pub fn with_capacity(history_capacity: usize) -> Result<Editor> {
        let config = Config::builder()
            .max_history_size(history_capacity)?
            .history_ignore_space(true)
            .completion_type(CompletionType::Circular)
            .build();

        let mut internal = rustyline::Editor::with_config(config)?;
        internal.set_helper(Some(EditorHelper(FilenameCompleter::new())));

        Ok(Editor {
            internal,
            history_capacity,
        })
    }

    /// Returns `None` when end of file is reached. An interrupted line
    /// (`^C`) reads as empty.
    pub fn readline(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.internal.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(e) => Err(e.into()),
        }
    }

    pub fn add_history_entry(&mut self, line: &str) {
        let temp_result = self.internal.add_history_entry(line);
        log_if_err!(temp_result, "failed to add history entry");
    }

    pub fn history_len(&self) -> usize {
        self.internal.history().len()
    }
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "history: {}/{}",
            self.history_len(),
            self.history_capacity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_with_capacity() {
        let editor = Editor::with_capacity(10).unwrap();
        assert_eq!(editor.history_len(), 0);
        assert_eq!(editor.history_capacity, 10);
    }

    #[test]
    fn add_history_entry_duplicate() {
        let mut editor = Editor::with_capacity(2).unwrap();
        editor.add_history_entry("dup");
        editor.add_history_entry("dup");
        assert_eq!(editor.history_len(), 1);
    }

    #[test]
    fn add_history_entry_rollover() {
        let mut editor = Editor::with_capacity(3).unwrap();
        for i in 0..5 {
            editor.add_history_entry(&format!("cmd{}", i));
        }
        assert_eq!(editor.history_len(), 3);
    }
}

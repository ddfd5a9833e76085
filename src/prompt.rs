use std::borrow::Cow;
use std::io::{self, BufRead, IsTerminal, Write};

use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal;
use reedline::{Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus, Reedline, Signal};
use tracing::debug;

use crate::config::FrontEnds;
use crate::error::LauncherError;

/// Supplies the raw run-mode answer. The launcher maps it with
/// [`RunMode::from_selection`](crate::launch::RunMode::from_selection).
pub trait SelectionSource {
    fn read_selection(&mut self) -> Result<String, LauncherError>;
}

/// A fixed answer, for `--mode` and for tests
#[derive(Debug, Clone)]
pub struct FixedSelection(pub String);

impl SelectionSource for FixedSelection {
    fn read_selection(&mut self) -> Result<String, LauncherError> {
        Ok(self.0.clone())
    }
}

/// Single-line prompt listing the three choices
struct SelectionPrompt {
    text: String,
}

impl SelectionPrompt {
    fn new(front_ends: &FrontEnds) -> Self {
        Self {
            text: format!(
                "Start which front-end? (0 = {}, 1 = {}, 2 = {}): ",
                front_ends.ide.program, front_ends.notebook.program, front_ends.shell.program
            ),
        }
    }
}

impl Prompt for SelectionPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        // Use ANSI reset code to ensure white/default terminal color
        Cow::Owned(format!("\x1b[0m{}", self.text))
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!("({}reverse search) ", prefix))
    }
}

/// Asks on the terminal, or reads one line when stdin is redirected
pub struct TerminalSelection {
    prompt: SelectionPrompt,
}

impl TerminalSelection {
    pub fn new(front_ends: &FrontEnds) -> Self {
        Self {
            prompt: SelectionPrompt::new(front_ends),
        }
    }

    fn read_piped(&self) -> Result<String, LauncherError> {
        print!("{}", self.prompt.text);
        io::stdout().flush().map_err(LauncherError::Prompt)?;
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(LauncherError::Prompt)?;
        Ok(line)
    }
}

impl SelectionSource for TerminalSelection {
    fn read_selection(&mut self) -> Result<String, LauncherError> {
        if !io::stdin().is_terminal() {
            return self.read_piped();
        }

        let mut line_editor = Reedline::create();
        match line_editor.read_line(&self.prompt) {
            Ok(Signal::Success(line)) => {
                debug!(selection = %line, "read selection");
                Ok(line)
            }
            Ok(Signal::CtrlC) => Err(LauncherError::Cancelled),
            // Ctrl+D answers with nothing, which selects the default
            Ok(_) => Ok(String::new()),
            Err(err) => Err(LauncherError::Prompt(err)),
        }
    }
}

/// Wait for a key press so a message stays readable in a console window
/// that closes when the launcher exits.
pub fn pause_for_acknowledgment() -> io::Result<()> {
    if !io::stdin().is_terminal() {
        return Ok(());
    }

    print!("Press any key to continue . . . ");
    io::stdout().flush()?;

    terminal::enable_raw_mode()?;
    let waited = wait_for_key();
    terminal::disable_raw_mode()?;
    println!();
    waited
}

fn wait_for_key() -> io::Result<()> {
    loop {
        if let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            return Ok(());
        }
    }
}

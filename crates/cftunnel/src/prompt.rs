use dialoguer::{Confirm, Input, Select};

use crate::error::Result;

/// Blocking user input used by the interactive shell.
pub trait Prompter {
    /// Pick one of `items`. `None` when the user backs out (Esc / `q`).
    fn select(&mut self, prompt: &str, items: &[String]) -> Result<Option<usize>>;

    /// Free-text input. An empty answer is returned as an empty string.
    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String>;

    /// Yes/no question.
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool>;

    /// Wait for Enter.
    fn pause(&mut self) -> Result<()>;
}

/// Terminal prompts backed by `dialoguer`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn select(&mut self, prompt: &str, items: &[String]) -> Result<Option<usize>> {
        let selection = Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact_opt()?;
        Ok(selection)
    }

    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::new().with_prompt(prompt).allow_empty(true);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?.trim().to_string())
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }

    fn pause(&mut self) -> Result<()> {
        Input::<String>::new()
            .with_prompt("Press Enter to continue")
            .allow_empty(true)
            .report(false)
            .interact_text()?;
        Ok(())
    }
}

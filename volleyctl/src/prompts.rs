use anyhow::Context;
use dialoguer::Confirm;
use volley_core::Prompt;

/// Asks the operator to confirm `prompt`. Enter accepts.
pub fn confirm(prompt: &Prompt) -> anyhow::Result<bool> {
    Confirm::new()
        .with_prompt(prompt.to_string())
        .default(true)
        .interact()
        .context("confirmation needs an interactive terminal, pass --yes to skip it")
}

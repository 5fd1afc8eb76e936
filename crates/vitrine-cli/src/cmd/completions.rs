use anyhow::{Context as _, Result};
use clap::Args;
use clap_complete::{Shell, generate};
use std::io::Write;

/// Arguments for `vt completions`.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Write the completion script for `shell` to `out`.
///
/// # Errors
///
/// Returns an error if `out` cannot be flushed.
pub fn run_completions(
    shell: Shell,
    command: &mut clap::Command,
    out: &mut dyn Write,
) -> Result<()> {
    generate(shell, command, "vt", out);
    out.flush().context("flush completion script")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::CommandFactory;

    fn script(shell: Shell) -> String {
        let mut buf = Vec::new();
        run_completions(shell, &mut Cli::command(), &mut buf).expect("generate");
        String::from_utf8(buf).expect("utf-8 script")
    }

    #[test]
    fn zsh_script_lists_every_subcommand() {
        let script = script(Shell::Zsh);
        assert!(script.starts_with("#compdef vt"), "{script}");
        for sub in ["init", "import", "index", "search", "serve"] {
            assert!(script.contains(sub), "missing {sub}");
        }
    }

    #[test]
    fn fish_script_completes_search_flags() {
        let script = script(Shell::Fish);
        assert!(script.contains("complete -c vt"));
        assert!(script.contains("-l limit"));
    }
}

//! `buildstep --completions <shell>`: shell completion scripts

use anyhow::{Context, Result};
use clap_complete::Shell;

/// Renders the completion script for `shell`
pub fn generate_completions(shell: Shell) -> Result<String> {
    use clap_complete::generate;

    let mut cmd = super::build_cli();
    let mut buf = Vec::new();
    generate(shell, &mut cmd, "buildstep", &mut buf);

    String::from_utf8(buf).context("Failed to generate completions")
}

//! Built-in commands
//!
//! | key | handler |
//! |-----|---------|
//! | `bash` | [`BashCommand`] |
//! | `systemctl` | [`SystemctlCommand`] |
//! | `systemctl-file` | [`SystemctlFileCommand`] |
//! | `http` | [`HttpCommand`] |
//! | `github-download` | [`GithubDownloadCommand`] |
//! | `dirs` | [`DirsCommand`] |
//! | `system` | [`SystemCommand`] |
//! | `time` | [`TimeCommand`] |
//! | `listCommands` | [`ListCommandsCommand`] |

pub mod archive;
pub mod bash;
pub mod dirs;
pub mod github;
pub mod http;
pub mod info;
pub mod list;
pub mod systemctl;

pub use bash::BashCommand;
pub use self::dirs::{DirsCommand, check_delete_allowed};
pub use github::{GithubDownloadCommand, ReleaseAsset, select_asset};
pub use http::HttpCommand;
pub use info::{SystemCommand, TimeCommand};
pub use list::ListCommandsCommand;
pub use systemctl::{ServiceManager, SystemctlCommand, SystemctlFileCommand, UnitFile};

use crate::executor::CommandRegistry;
use crate::pipeline::{Params, StepError};

/// Registers every built-in command
pub fn register_builtin(registry: &mut CommandRegistry) {
    registry.register(BashCommand);
    registry.register(SystemctlCommand);
    registry.register(SystemctlFileCommand);
    registry.register(HttpCommand::default());
    registry.register(GithubDownloadCommand::default());
    registry.register(DirsCommand);
    registry.register(SystemCommand);
    registry.register(TimeCommand);
    registry.register(ListCommandsCommand);
}

/// Reads a mandatory, non-empty text entry from a mapping
pub(crate) fn required(params: &Params, key: &str, command: &str) -> Result<String, StepError> {
    params
        .get_str(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| StepError::invalid_params(command, format!("missing '{key}'")))
}

/// Rejects anything but a mapping
pub(crate) fn expect_mapping(params: &Params, command: &str) -> Result<(), StepError> {
    if params.as_mapping().is_some() {
        Ok(())
    } else {
        Err(StepError::invalid_params(
            command,
            format!("expected a mapping, got {}", params.kind()),
        ))
    }
}

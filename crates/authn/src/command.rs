//! Administrative command tokens.
//!
//! A command token is signed by the master issuer and carries
//! `grants = "command:argument"` instead of a grant list. The token only
//! authorizes the exact command and argument the caller is attempting.

use std::fmt;

use crate::error::{AuthError, Result};

/// Known administrative commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Register or replace a trusted issuer key.
    UpdateIssuer,
    /// Install resources for an origin.
    UpdateOrigin,
}

impl Command {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Command::UpdateIssuer => "update_issuer",
            Command::UpdateOrigin => "update_origin",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verified `command:argument` pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandToken {
    subject: String,
    command: String,
    argument: String,
}

impl CommandToken {
    /// Splits `encoded` on its first `:`.
    pub(crate) fn parse(subject: &str, encoded: &str) -> Result<Self> {
        let (command, argument) = encoded.split_once(':').ok_or_else(|| {
            AuthError::invalid_grant(format!("expected command:argument, got '{encoded}'"))
        })?;
        Ok(Self { subject: subject.to_owned(), command: command.to_owned(), argument: argument.to_owned() })
    }

    /// Subject of the command token.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Command name as carried by the token.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Command argument.
    #[must_use]
    pub fn argument(&self) -> &str {
        &self.argument
    }

    /// Checks that the token authorizes `command` on `argument`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CommandMismatch`] if either part differs.
    pub fn require(&self, command: Command, argument: &str) -> Result<()> {
        if self.command != command.as_str() || self.argument != argument {
            return Err(AuthError::command_mismatch(
                format!("{command}:{argument}"),
                format!("{}:{}", self.command, self.argument),
            ));
        }
        Ok(())
    }
}

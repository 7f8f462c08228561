//! Instance boot scripts.

use serde_json::Value;

use crate::template::intrinsics::base64;

/// Commands run by the instance on first boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    shebang: String,
    lines: Vec<String>,
}

impl UserData {
    /// A bash script.
    pub fn for_linux() -> Self {
        Self::custom("#!/bin/bash")
    }

    pub fn custom(shebang: impl Into<String>) -> Self {
        Self {
            shebang: shebang.into(),
            lines: Vec::new(),
        }
    }

    /// Append commands, unmodified and in order.
    pub fn add_commands<I, S>(&mut self, commands: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(commands.into_iter().map(Into::into));
    }

    pub fn commands(&self) -> &[String] {
        &self.lines
    }

    /// The script text.
    pub fn render(&self) -> String {
        std::iter::once(self.shebang.as_str())
            .chain(self.lines.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `Fn::Base64` of the script, as used by the `UserData` property.
    pub fn to_property(&self) -> Value {
        base64(self.render())
    }
}

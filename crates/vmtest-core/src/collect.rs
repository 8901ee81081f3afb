//! Collection script protocol.
//!
//! A collection script is an ordered list of [`CommandBlock`]s. Scenario
//! layers extend a base script by appending blocks; nothing ever removes or
//! reorders an earlier command. Command text is opaque: the harness only
//! guarantees ordering and replaces [`OUTPUT_DIR_TOKEN`] with the guest output
//! directory when rendering.
//!
//! Rendered scripts do not use `set -e`. A command that fails (a tool
//! missing on this release, a path that was never created) leaves its output
//! file absent or empty, and that absence is what assertions observe.

use serde::{Deserialize, Serialize};

/// Placeholder replaced with the guest output directory before execution.
pub const OUTPUT_DIR_TOKEN: &str = "OUTPUT_COLLECT_D";

/// Version of the rendered script layout.
pub const PROTOCOL_VERSION: u32 = 1;

/// One ordered group of shell command lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBlock {
    commands: Vec<String>,
}

impl CommandBlock {
    /// Creates a block from individual command lines.
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses an indented text block.
    ///
    /// The common leading indentation is removed, trailing whitespace is
    /// trimmed and blank lines are dropped. Relative indentation (for example
    /// on a backslash continuation line) is kept.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let indent = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
            .min()
            .unwrap_or(0);

        let commands = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line[indent..].trim_end().to_string())
            .collect();

        Self { commands }
    }

    /// Returns the command lines in order.
    #[must_use]
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Returns true if the block has no commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Ordered, append-only sequence of command blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectScript {
    blocks: Vec<CommandBlock>,
}

impl CollectScript {
    /// Creates an empty script.
    #[must_use]
    pub const fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Creates a script holding one block parsed from `text`.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self::new().extended(CommandBlock::from_text(text))
    }

    /// Returns a new script with `block` appended after every existing block.
    ///
    /// Empty blocks are ignored.
    #[must_use]
    pub fn extended(&self, block: CommandBlock) -> Self {
        let mut blocks = self.blocks.clone();
        if !block.is_empty() {
            blocks.push(block);
        }
        Self { blocks }
    }

    /// Returns the blocks in execution order.
    #[must_use]
    pub fn blocks(&self) -> &[CommandBlock] {
        &self.blocks
    }

    /// Iterates over every command line in execution order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.blocks
            .iter()
            .flat_map(|block| block.commands.iter().map(String::as_str))
    }

    /// Returns true if every command of `base` appears, in order, at the start of `self`.
    #[must_use]
    pub fn starts_with(&self, base: &Self) -> bool {
        let mut ours = self.commands();
        base.commands().all(|cmd| ours.next() == Some(cmd))
    }

    /// Returns true if the script has no commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Renders the script for execution with `output_dir` injected.
    ///
    /// `output_dir` is substituted verbatim, so it must be shell-safe.
    #[must_use]
    pub fn render(&self, output_dir: &str) -> String {
        let mut out = String::new();
        out.push_str("#!/bin/sh\n");
        out.push_str(&format!("# vmtest collect protocol v{PROTOCOL_VERSION}\n"));
        out.push_str(&format!("mkdir -p {output_dir}\n"));
        for block in &self.blocks {
            out.push('\n');
            for cmd in &block.commands {
                out.push_str(&cmd.replace(OUTPUT_DIR_TOKEN, output_dir));
                out.push('\n');
            }
        }
        out
    }
}

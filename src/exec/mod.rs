//! Shell command plumbing: classification, execution and output formatting.

pub mod output;
pub mod parser;
pub mod shell;

pub use output::{FormattedOutput, format_output};
pub use parser::{ParsedCommand, parse, tokenize};
pub use shell::{ShellCommandResult, ShellRunner, SystemShellRunner};

//! Best-effort shell command tokenizer and intent classifier.
//!
//! This is not a shell grammar. The tokenizer understands single quotes,
//! double quotes and backslash escapes well enough to split typical agent
//! commands into argv, and the classifier maps a handful of read-only
//! programs (`cat`, `ls`, `rg`, ...) to an exploration intent.
//!
//! Classification is advisory bookkeeping for the UI and session log. It is
//! never a security boundary: anything unrecognised degrades to
//! [`ParsedCommand::Unknown`] and still runs in the sandbox.
//!
//! Known approximation: escape handling is not quote-aware. A backslash
//! escapes the next character even inside single quotes, where a POSIX shell
//! would keep it literally.

use serde::{Deserialize, Serialize};

/// Semantic intent of a shell command.
///
/// Every variant keeps the original command string so consumers can show it
/// verbatim next to the classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParsedCommand {
    /// `cat`/`head`/`tail` naming at least one file.
    Read { original: String, files: Vec<String> },
    /// `ls`, defaulting to `.` when no path is given.
    ListFiles { original: String, path: String },
    /// `rg`/`grep` family with a query and an optional path.
    Search {
        original: String,
        query: String,
        path: Option<String>,
    },
    /// Anything else.
    Unknown { original: String },
}

impl ParsedCommand {
    /// The raw command line this classification was derived from.
    pub fn original(&self) -> &str {
        match self {
            ParsedCommand::Read { original, .. }
            | ParsedCommand::ListFiles { original, .. }
            | ParsedCommand::Search { original, .. }
            | ParsedCommand::Unknown { original } => original,
        }
    }

    /// Whether the command is a read-only exploration (read, list, search).
    pub fn is_exploration(&self) -> bool {
        !matches!(self, ParsedCommand::Unknown { .. })
    }
}

/// Split a raw command line into tokens.
///
/// Quote characters toggle quoting state and are elided from the output.
/// Unquoted whitespace ends the current token. A trailing lone backslash is
/// kept as a literal backslash.
pub fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escaped = false;

    for ch in command.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '\'' && !in_double_quote {
            in_single_quote = !in_single_quote;
        } else if ch == '"' && !in_single_quote {
            in_double_quote = !in_double_quote;
        } else if ch.is_whitespace() && !in_single_quote && !in_double_quote {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }

    if escaped {
        current.push('\\');
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Classify a tokenized command.
///
/// `original` is the raw command line the tokens came from; it is carried
/// through unchanged on every variant.
pub fn parse(tokens: &[String], original: &str) -> ParsedCommand {
    let Some((program, args)) = tokens.split_first() else {
        return unknown(original);
    };

    match program.to_lowercase().as_str() {
        "cat" | "head" | "tail" => parse_read(args, original),
        "ls" => parse_list(args, original),
        "rg" | "ripgrep" | "ag" | "ack" | "grep" | "egrep" | "fgrep" => {
            parse_search(args, original)
        }
        _ => unknown(original),
    }
}

fn unknown(original: &str) -> ParsedCommand {
    ParsedCommand::Unknown {
        original: original.to_string(),
    }
}

fn is_flag(arg: &str) -> bool {
    arg.starts_with('-')
}

fn parse_read(args: &[String], original: &str) -> ParsedCommand {
    let files: Vec<String> = args.iter().filter(|a| !is_flag(a)).cloned().collect();
    // A read naming no files (e.g. `cat` on stdin) tells us nothing useful.
    if files.is_empty() {
        return unknown(original);
    }
    ParsedCommand::Read {
        original: original.to_string(),
        files,
    }
}

fn parse_list(args: &[String], original: &str) -> ParsedCommand {
    let path = args
        .iter()
        .find(|a| !is_flag(a))
        .cloned()
        .unwrap_or_else(|| ".".to_string());
    ParsedCommand::ListFiles {
        original: original.to_string(),
        path,
    }
}

fn parse_search(args: &[String], original: &str) -> ParsedCommand {
    let mut positional = args.iter().filter(|a| !is_flag(a));
    match positional.next() {
        Some(query) => ParsedCommand::Search {
            original: original.to_string(),
            query: query.clone(),
            path: positional.next().cloned(),
        },
        None => unknown(original),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tokenize_strips_double_quotes() {
        assert_eq!(tokenize("echo \"hello\""), vec!["echo", "hello"]);
    }

    #[test]
    fn tokenize_ignores_outer_whitespace() {
        assert_eq!(tokenize("  echo \"hello\"  "), vec!["echo", "hello"]);
    }

    #[test]
    fn tokenize_keeps_quoted_whitespace_in_one_token() {
        assert_eq!(
            tokenize("grep 'two words' src"),
            vec!["grep", "two words", "src"]
        );
    }

    #[test]
    fn tokenize_escaped_space_joins_token() {
        assert_eq!(tokenize(r"cat my\ file.txt"), vec!["cat", "my file.txt"]);
    }

    #[test]
    fn tokenize_trailing_backslash_is_literal() {
        assert_eq!(tokenize("echo abc\\"), vec!["echo", "abc\\"]);
    }

    #[test]
    fn tokenize_backslash_escapes_inside_single_quotes() {
        // Not POSIX: the escape consumes the quote character.
        assert_eq!(tokenize(r"echo 'a\'b'"), vec!["echo", "a'b"]);
    }

    #[test]
    fn tokenize_blank_input_is_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t ").is_empty());
    }

    #[test]
    fn parse_empty_tokens_is_unknown() {
        assert_eq!(
            parse(&[], ""),
            ParsedCommand::Unknown {
                original: String::new()
            }
        );
    }

    #[test]
    fn parse_program_name_is_case_insensitive() {
        let cmd = parse(&toks(&["CAT", "a.txt"]), "CAT a.txt");
        assert!(matches!(cmd, ParsedCommand::Read { .. }));
    }

    #[test]
    fn parse_tail_with_flags_only_is_unknown() {
        let cmd = parse(&toks(&["tail", "-f"]), "tail -f");
        assert!(!cmd.is_exploration());
    }

    #[test]
    fn parse_search_with_only_flags_is_unknown() {
        let cmd = parse(&toks(&["rg", "-n", "-i"]), "rg -n -i");
        assert!(matches!(cmd, ParsedCommand::Unknown { .. }));
    }

    #[test]
    fn original_is_carried_on_every_variant() {
        let cmd = parse(&toks(&["ls"]), "ls");
        assert_eq!(cmd.original(), "ls");
        assert!(cmd.is_exploration());
    }
}

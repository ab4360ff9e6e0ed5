//! Literal shell-command heuristics
//!
//! Commands are split on whitespace and matched against a short, ordered
//! list of token patterns. There is no shell grammar here: quotes, globs,
//! pipelines and multiple path arguments are taken at face value, and
//! anything that does not match is opaque.

use std::path::PathBuf;

/// What a shell command is taken to have done
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellAction {
    DeleteFile(PathBuf),
    Rename { from: PathBuf, to: PathBuf },
    CreateDirectory(PathBuf),
    DeleteDirectory(PathBuf),
    Opaque,
}

/// Classify a command recorded in an activity log. First match wins:
/// `rm [-rf] <path>` (skipped when `rmdir` appears), `mv <src> <dst>`,
/// `mkdir [-p] <path>`.
pub fn classify(command: &str) -> ShellAction {
    let tokens: Vec<&str> = command.split_whitespace().collect();

    if !tokens.contains(&"rmdir") {
        if let Some(path) = rm_target(&tokens) {
            return ShellAction::DeleteFile(PathBuf::from(path));
        }
    }

    if let Some(pos) = position(&tokens, "mv") {
        if let (Some(from), Some(to)) = (tokens.get(pos + 1), tokens.get(pos + 2)) {
            return ShellAction::Rename {
                from: PathBuf::from(from),
                to: PathBuf::from(to),
            };
        }
    }

    if let Some(pos) = position(&tokens, "mkdir") {
        let mut idx = pos + 1;
        if tokens.get(idx) == Some(&"-p") {
            idx += 1;
        }
        if let Some(path) = tokens.get(idx) {
            return ShellAction::CreateDirectory(PathBuf::from(path));
        }
    }

    ShellAction::Opaque
}

/// Classify a command seen by the tool hook, before it runs. Recursive
/// removals are recognised as directory deletes; everything else falls back
/// to [`classify`].
pub fn classify_tracked(command: &str) -> ShellAction {
    let tokens: Vec<&str> = command.split_whitespace().collect();

    if let Some(pos) = position(&tokens, "rmdir") {
        if let Some(path) = first_operand(&tokens[pos + 1..]) {
            return ShellAction::DeleteDirectory(PathBuf::from(path));
        }
    }

    if let Some(pos) = position(&tokens, "rm") {
        let args = &tokens[pos + 1..];
        let recursive = args
            .iter()
            .take_while(|t| t.starts_with('-') && **t != "--")
            .any(|t| match t.strip_prefix("--") {
                Some(long) => long == "recursive",
                None => t.contains('r') || t.contains('R'),
            });
        if recursive {
            if let Some(path) = first_operand(args) {
                return ShellAction::DeleteDirectory(PathBuf::from(path));
            }
        }
    }

    classify(command)
}

fn position(tokens: &[&str], word: &str) -> Option<usize> {
    tokens.iter().position(|t| *t == word)
}

fn rm_target<'a>(tokens: &[&'a str]) -> Option<&'a str> {
    let pos = position(tokens, "rm")?;
    let mut idx = pos + 1;
    if tokens.get(idx).is_some_and(|t| is_rf_flag(t)) {
        idx += 1;
    }
    tokens.get(idx).copied()
}

/// `-r`, `-f`, `-rf`, `-fr`, ...
fn is_rf_flag(token: &str) -> bool {
    token
        .strip_prefix('-')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c == 'r' || c == 'f'))
}

fn first_operand<'a>(args: &[&'a str]) -> Option<&'a str> {
    args.iter().copied().find(|t| !t.starts_with('-'))
}

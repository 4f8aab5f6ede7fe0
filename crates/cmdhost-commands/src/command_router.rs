use std::sync::Arc;

use cmdhost_args::ParsedArguments;

use crate::{CommandError, CommandHandler, CommandNode, CommandTree};

#[derive(Debug, Clone)]
pub struct ResolvedCommand {
    pub handler: Arc<CommandHandler>,
    pub path: Vec<String>,
    /// Raw-token indices of the positional entries the route consumed.
    pub consumed: Vec<usize>,
}

/// Walks `tree` along the leading positional tokens.
///
/// Only a walk that ends on a handler resolves; stopping on a sub-tree is
/// reported as not found rather than running anything.
pub fn route_command(
    tree: &CommandTree,
    parsed: &ParsedArguments,
) -> Result<ResolvedCommand, CommandError> {
    let mut pool = tree;
    let mut last = None;
    let mut path = Vec::new();
    let mut consumed = Vec::new();
    let mut missed = None;

    for (position, token) in parsed.positional.iter().enumerate() {
        let Some(node) = pool.get(token) else {
            missed = Some(token.as_str());
            break;
        };
        path.push(token.clone());
        consumed.push(parsed.positional_origin(position).unwrap_or(position));
        last = Some(node);
        match node {
            CommandNode::Branch(children) => pool = children,
            CommandNode::Leaf(_) => break,
        }
    }

    if let Some(CommandNode::Leaf(handler)) = last {
        return Ok(ResolvedCommand {
            handler: Arc::clone(handler),
            path,
            consumed,
        });
    }

    let command = match missed {
        Some(token) => Some(
            path.iter()
                .map(String::as_str)
                .chain([token])
                .collect::<Vec<_>>()
                .join(" "),
        ),
        None if path.is_empty() => None,
        None => Some(path.join(" ")),
    };
    let suggestion = missed.and_then(|token| {
        suggest_command(token, &pool.names()).map(|name| {
            path.iter()
                .map(String::as_str)
                .chain([name])
                .collect::<Vec<_>>()
                .join(" ")
        })
    });
    Err(CommandError::CommandNotFound {
        command,
        suggestion,
    })
}

pub(crate) fn not_found_message(command: Option<&str>, suggestion: Option<&str>) -> String {
    match (command, suggestion) {
        (None, _) => "command not found: no command given".to_string(),
        (Some(command), Some(suggestion)) => {
            format!("command not found: {command}\ndid you mean {suggestion}?")
        }
        (Some(command), None) => format!("command not found: {command}"),
    }
}

/// Closest sibling of a mistyped segment, if any is close enough.
///
/// Every candidate is scored; completions of the typed text outrank edits and
/// ties fall back to name order, so the result does not depend on how the
/// candidates are listed.
fn suggest_command<'a>(typed: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let typed = typed.to_lowercase();
    if typed.is_empty() {
        return None;
    }
    let budget = edit_budget(typed.chars().count());
    candidates
        .iter()
        .copied()
        .filter_map(|candidate| {
            let folded = candidate.to_lowercase();
            let score = if folded.starts_with(&typed) {
                (0, folded.chars().count() - typed.chars().count())
            } else {
                let distance = edit_distance(&typed, &folded);
                if distance > budget {
                    return None;
                }
                (1, distance)
            };
            Some((score, candidate))
        })
        .min()
        .map(|(_, candidate)| candidate)
}

fn edit_budget(typed_len: usize) -> usize {
    match typed_len {
        0..=4 => 1,
        5..=8 => 2,
        _ => 3,
    }
}

/// Levenshtein distance over chars, keeping two rows.
fn edit_distance(from: &str, to: &str) -> usize {
    let to = to.chars().collect::<Vec<_>>();
    let mut above = (0..=to.len()).collect::<Vec<_>>();
    let mut row = vec![0; to.len() + 1];

    for (i, from_char) in from.chars().enumerate() {
        row[0] = i + 1;
        for (j, to_char) in to.iter().enumerate() {
            let replace = above[j] + usize::from(from_char != *to_char);
            row[j + 1] = replace.min(above[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut above, &mut row);
    }
    above[to.len()]
}

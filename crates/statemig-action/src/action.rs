//! Action variants and their command-string form
//!
//! Documents list actions as shell-like command lines:
//!
//! | command                         | action              |
//! |---------------------------------|---------------------|
//! | `mv SRC DST`                    | [`Action::Move`]    |
//! | `import ADDR ID`                | [`Action::Import`]  |
//! | `rm ADDR...`                    | [`Action::Remove`] per address |
//! | `forget ADDR...`                | [`Action::RemoveFromState`] per address |
//! | `xmv PATTERN TEMPLATE`          | [`Action::MoveWildcard`] |
//! | `replace-provider FROM TO`      | [`Action::ReplaceProvider`] |
//!
//! Arguments are split on whitespace. Single quotes keep their content
//! verbatim; inside double quotes and bare words a backslash escapes the
//! next character. Addresses with string keys therefore need quoting:
//! `rm 'aws_iam_user.u["alice"]'`.

use crate::error::ActionParseError;
use crate::wildcard::WildcardMove;
use statemig_state::ResourceAddress;
use std::fmt::{self, Display, Formatter};

/// One primitive state edit
///
/// Carries addresses and identifiers only, never resource bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Relocate a module, resource or instance
    Move {
        source: ResourceAddress,
        destination: ResourceAddress,
    },

    /// Start tracking an existing remote object
    Import {
        address: ResourceAddress,
        external_id: String,
    },

    /// Stop tracking, leaving the remote object alone
    Remove { address: ResourceAddress },

    /// Drop records from state only; used for objects already gone remotely
    RemoveFromState { address: ResourceAddress },

    /// Move every instance matching a `*` pattern
    MoveWildcard {
        source_pattern: String,
        destination_template: String,
    },

    /// Rewrite the provider of every record using `from`
    ReplaceProvider { from: String, to: String },
}

impl Action {
    /// Command word of this action
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Move { .. } => "mv",
            Self::Import { .. } => "import",
            Self::Remove { .. } => "rm",
            Self::RemoveFromState { .. } => "forget",
            Self::MoveWildcard { .. } => "xmv",
            Self::ReplaceProvider { .. } => "replace-provider",
        }
    }

    /// Parse one command line
    ///
    /// `rm` and `forget` accept several addresses and yield one action each.
    ///
    /// # Errors
    /// Returns [`ActionParseError`] for unknown commands, wrong arity,
    /// unbalanced quotes, malformed addresses and unusable wildcard patterns
    pub fn parse_line(line: &str) -> Result<Vec<Self>, ActionParseError> {
        let words = tokenize(line)?;
        let Some((verb, args)) = words.split_first() else {
            return Err(ActionParseError::Empty);
        };

        let arity = |expected: &'static str| ActionParseError::Arity {
            verb: verb.clone(),
            expected,
            found: args.len(),
        };

        match verb.as_str() {
            "mv" => match args {
                [source, destination] => Ok(vec![Self::Move {
                    source: source.parse()?,
                    destination: destination.parse()?,
                }]),
                _ => Err(arity("2 arguments")),
            },
            "import" => match args {
                [address, id] => Ok(vec![Self::Import {
                    address: address.parse()?,
                    external_id: id.clone(),
                }]),
                _ => Err(arity("2 arguments")),
            },
            "rm" | "forget" => {
                if args.is_empty() {
                    return Err(arity("at least 1 argument"));
                }
                args.iter()
                    .map(|a| {
                        let address: ResourceAddress = a.parse()?;
                        Ok(if verb == "rm" {
                            Self::Remove { address }
                        } else {
                            Self::RemoveFromState { address }
                        })
                    })
                    .collect()
            }
            "xmv" => match args {
                [pattern, template] => {
                    WildcardMove::compile(pattern, template).map_err(|reason| {
                        ActionParseError::Wildcard {
                            pattern: pattern.clone(),
                            template: template.clone(),
                            reason,
                        }
                    })?;
                    Ok(vec![Self::MoveWildcard {
                        source_pattern: pattern.clone(),
                        destination_template: template.clone(),
                    }])
                }
                _ => Err(arity("2 arguments")),
            },
            "replace-provider" => match args {
                [from, to] => Ok(vec![Self::ReplaceProvider {
                    from: from.clone(),
                    to: to.clone(),
                }]),
                _ => Err(arity("2 arguments")),
            },
            other => Err(ActionParseError::UnknownVerb(other.to_string())),
        }
    }

    /// Parse a list of command lines, preserving order
    ///
    /// # Errors
    /// Returns the first line that fails, with its position
    pub fn parse_all<S: AsRef<str>>(lines: &[S]) -> Result<Vec<Self>, (usize, ActionParseError)> {
        let mut actions = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            actions.extend(Self::parse_line(line.as_ref()).map_err(|e| (i, e))?);
        }
        Ok(actions)
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = match self {
            Self::Move {
                source,
                destination,
            } => vec![source.to_string(), destination.to_string()],
            Self::Import {
                address,
                external_id,
            } => vec![address.to_string(), external_id.clone()],
            Self::Remove { address } | Self::RemoveFromState { address } => {
                vec![address.to_string()]
            }
            Self::MoveWildcard {
                source_pattern,
                destination_template,
            } => vec![source_pattern.clone(), destination_template.clone()],
            Self::ReplaceProvider { from, to } => vec![from.clone(), to.clone()],
        };
        f.write_str(self.verb())?;
        for arg in &args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

/// Split a command line into words
fn tokenize(line: &str) -> Result<Vec<String>, ActionParseError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(ActionParseError::UnbalancedQuote(line.to_string())),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c) => current.push(c),
                            None => {
                                return Err(ActionParseError::UnbalancedQuote(line.to_string()))
                            }
                        },
                        Some(c) => current.push(c),
                        None => return Err(ActionParseError::UnbalancedQuote(line.to_string())),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(c) => current.push(c),
                    None => return Err(ActionParseError::DanglingEscape(line.to_string())),
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Quote a word so [`tokenize`] reads it back unchanged
fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && !word
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '\\'));
    if plain {
        word.to_string()
    } else if !word.contains('\'') {
        format!("'{word}'")
    } else {
        let mut out = String::from("\"");
        for c in word.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
        out
    }
}

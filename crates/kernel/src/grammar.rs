// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Turning command text into actions. Behaviors contribute prose patterns of their own, which are
//! tried before the built-in verbs.

use crate::actions::Action;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProseError {
    #[error("empty prose pattern")]
    Empty,
    #[error("unterminated slot in `{0}`")]
    Unterminated(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Word(String),
    Slot(String),
}

/// A command pattern such as `poke {item}` or `say {text}`. Words match case-insensitively. A
/// slot takes one word, except the last slot which takes everything that remains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prose {
    parts: Vec<Part>,
}

impl FromStr for Prose {
    type Err = ProseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = vec![];
        for word in s.split_whitespace() {
            match word.strip_prefix('{') {
                Some(rest) => {
                    let name = rest
                        .strip_suffix('}')
                        .filter(|n| !n.is_empty())
                        .ok_or_else(|| ProseError::Unterminated(s.to_string()))?;
                    parts.push(Part::Slot(name.to_string()));
                }
                None => parts.push(Part::Word(word.to_lowercase())),
            }
        }
        if parts.is_empty() {
            return Err(ProseError::Empty);
        }
        Ok(Self { parts })
    }
}

impl Display for Prose {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut words = self.parts.iter().map(|p| match p {
            Part::Word(w) => w.clone(),
            Part::Slot(s) => format!("{{{s}}}"),
        });
        write!(f, "{}", words.join(" "))
    }
}

impl Prose {
    /// Slot values when `command` matches the whole pattern.
    pub fn matches(&self, command: &str) -> Option<BTreeMap<String, String>> {
        let words: Vec<&str> = command.split_whitespace().collect();
        let last_slot = self.parts.iter().rposition(|p| matches!(p, Part::Slot(_)));
        let mut args = BTreeMap::new();
        let mut at = 0;
        for (i, part) in self.parts.iter().enumerate() {
            match part {
                Part::Word(expected) => {
                    let word = words.get(at)?;
                    if word.to_lowercase() != *expected {
                        return None;
                    }
                    at += 1;
                }
                Part::Slot(name) if Some(i) == last_slot => {
                    // Leave room for any literal words after the final slot.
                    let trailing = self.parts.len() - i - 1;
                    let end = words.len().checked_sub(trailing)?;
                    if end <= at {
                        return None;
                    }
                    args.insert(name.clone(), words[at..end].join(" "));
                    at = end;
                }
                Part::Slot(name) => {
                    args.insert(name.clone(), words.get(at)?.to_string());
                    at += 1;
                }
            }
        }
        (at == words.len()).then_some(args)
    }
}

/// The built-in verbs. `None` when nothing here understands the command.
pub fn evaluate(command: &str) -> Option<Action> {
    let command = command.trim();
    let (verb, rest) = match command.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (command, ""),
    };
    let verb = verb.to_lowercase();
    let noun = || (!rest.is_empty()).then(|| rest.to_string());
    match verb.as_str() {
        "look" | "l" if rest.is_empty() => Some(Action::Look),
        "hold" | "get" | "take" => noun().map(|item| Action::Hold { item }),
        "drop" => Some(Action::Drop { item: noun() }),
        "create" | "make" => noun().map(|name| Action::Create { name }),
        "wear" => noun().map(|item| Action::Wear { item }),
        "remove" => noun().map(|item| Action::Remove { item }),
        "freeze" => noun().map(|item| Action::Freeze { item }),
        "unfreeze" => noun().map(|item| Action::Unfreeze { item }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn args(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test_case("poke", "poke" => Some(args(&[])); "bare word")]
    #[test_case("poke", "POKE" => Some(args(&[])); "case insensitive")]
    #[test_case("poke", "poke it" => None; "extra words")]
    #[test_case("poke {item}", "poke red ball" => Some(args(&[("item", "red ball")])); "last slot takes rest")]
    #[test_case("poke {item}", "poke" => None; "slot needs a word")]
    #[test_case("give {who} {item}", "give jacob the key" => Some(args(&[("who", "jacob"), ("item", "the key")])); "two slots")]
    #[test_case("put {item} away", "put the key away" => Some(args(&[("item", "the key")])); "trailing word")]
    #[test_case("put {item} away", "put away" => None; "trailing word empty slot")]
    fn test_prose(pattern: &str, command: &str) -> Option<BTreeMap<String, String>> {
        pattern.parse::<Prose>().unwrap().matches(command)
    }

    #[test]
    fn test_bad_prose() {
        assert_eq!("".parse::<Prose>(), Err(ProseError::Empty));
        assert!(matches!(
            "poke {item".parse::<Prose>(),
            Err(ProseError::Unterminated(_))
        ));
        assert_eq!(
            "Poke {item}".parse::<Prose>().unwrap().to_string(),
            "poke {item}"
        );
    }

    #[test_case("look" => Some(Action::Look); "look")]
    #[test_case("l" => Some(Action::Look); "look short")]
    #[test_case("get box" => Some(Action::Hold { item: "box".to_string() }); "get")]
    #[test_case("take red box" => Some(Action::Hold { item: "red box".to_string() }); "take")]
    #[test_case("drop" => Some(Action::Drop { item: None }); "drop everything")]
    #[test_case("drop box" => Some(Action::Drop { item: Some("box".to_string()) }); "drop one")]
    #[test_case("create coin" => Some(Action::Create { name: "coin".to_string() }); "create")]
    #[test_case("freeze box" => Some(Action::Freeze { item: "box".to_string() }); "freeze")]
    #[test_case("wear hat" => Some(Action::Wear { item: "hat".to_string() }); "wear")]
    #[test_case("remove hat" => Some(Action::Remove { item: "hat".to_string() }); "remove")]
    #[test_case("hold" => None; "hold without noun")]
    #[test_case("dance" => None; "unknown")]
    fn test_static(command: &str) -> Option<Action> {
        evaluate(command)
    }
}

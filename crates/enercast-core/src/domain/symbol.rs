use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Commodity benchmark symbol: `WTI`, `BRENT`, `HENRY_HUB`, `NBP-M1`.
///
/// Stored upper-cased. A symbol starts with a letter, holds at most
/// [`Symbol::MAX_LEN`] ASCII letters and digits, and may join segments with
/// `.`, `-` or `_`. A separator never ends a symbol or follows another one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub const MAX_LEN: usize = 15;

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let symbol = input.trim().to_ascii_uppercase();
        let Some(first) = symbol.chars().next() else {
            return Err(ValidationError::EmptySymbol);
        };
        if !first.is_ascii_alphabetic() {
            return Err(ValidationError::SymbolInvalidStart { ch: first });
        }

        let mut after_separator = false;
        for (index, ch) in symbol.char_indices() {
            if is_separator(ch) {
                if after_separator {
                    return Err(ValidationError::SymbolMisplacedSeparator { value: symbol });
                }
                after_separator = true;
            } else if ch.is_ascii_alphanumeric() {
                after_separator = false;
            } else {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }
        if after_separator {
            return Err(ValidationError::SymbolMisplacedSeparator { value: symbol });
        }

        // Every character is ASCII by now, so bytes and characters agree.
        if symbol.len() > Self::MAX_LEN {
            return Err(ValidationError::SymbolTooLong {
                len: symbol.len(),
                max: Self::MAX_LEN,
            });
        }

        Ok(Self(symbol))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_separator(ch: char) -> bool {
    matches!(ch, '.' | '-' | '_')
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

// CLASSIFICATION: COMMUNITY
// Filename: command.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Operator command grammar.

use std::ops::Range;
use std::str::FromStr;

use thiserror::Error;

/// Operator input that could not be used. Recovered by re-prompting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command {0:?}")]
    UnknownVerb(String),
    #[error("{0:?} is not a page number")]
    InvalidPage(String),
    #[error("page {index} is out of range (0-{last}, or -1 for all)")]
    PageOutOfRange { index: i64, last: i64 },
}

/// What the operator wants done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Read,
    Write,
    Inspect,
    Quit,
}

impl FromStr for Verb {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "r" | "read" => Ok(Verb::Read),
            "w" | "write" => Ok(Verb::Write),
            "v" | "view" | "inspect" => Ok(Verb::Inspect),
            "q" | "quit" | "exit" => Ok(Verb::Quit),
            other => Err(CommandError::UnknownVerb(other.to_string())),
        }
    }
}

/// Pages a command applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelector {
    One(usize),
    All,
}

impl PageSelector {
    /// Parse a page index against a region of `pages` pages. `-1` and `all`
    /// select every page.
    pub fn parse(input: &str, pages: usize) -> Result<Self, CommandError> {
        let input = input.trim();
        if input.eq_ignore_ascii_case("all") {
            return Ok(PageSelector::All);
        }
        let index: i64 = input
            .parse()
            .map_err(|_| CommandError::InvalidPage(input.to_string()))?;
        let last = pages as i64 - 1;
        match index {
            -1 => Ok(PageSelector::All),
            i if (0..=last).contains(&i) => Ok(PageSelector::One(i as usize)),
            i => Err(CommandError::PageOutOfRange { index: i, last }),
        }
    }

    /// Page indexes covered by this selector.
    pub fn pages(self, pages: usize) -> Range<usize> {
        match self {
            PageSelector::One(page) => page..page + 1,
            PageSelector::All => 0..pages,
        }
    }
}

// CLASSIFICATION: COMMUNITY
// Filename: state.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! MSI page states.

use std::fmt;

/// Coherence state of one page on this peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PageState {
    /// Only this peer holds a valid, possibly dirty copy.
    Modified = 1,
    /// This peer holds a valid clean copy; the peer may too.
    Shared = 2,
    /// The local copy must be refreshed before use.
    #[default]
    Invalid = 3,
}

impl PageState {
    /// Upper-case label used by the inspect command.
    pub fn label(self) -> &'static str {
        match self {
            PageState::Modified => "MODIFIED",
            PageState::Shared => "SHARED",
            PageState::Invalid => "INVALID",
        }
    }

    /// Whether the local bytes may be read without a fetch.
    pub fn is_valid(self) -> bool {
        !matches!(self, PageState::Invalid)
    }

    /// Whether the local bytes may be written without an invalidate.
    pub fn is_exclusive(self) -> bool {
        matches!(self, PageState::Modified)
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// CLASSIFICATION: COMMUNITY
// Filename: dispatcher.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Interactive read/write/inspect driver.
//!
//! Prompts are line oriented. Bad input re-prompts without touching any
//! page; every memory access goes through the coherence engine first.

use std::io::{BufRead, Write};

use log::debug;

use crate::coherence::{CoherenceEngine, CoherenceError, PageRead, PageState};
use crate::error::DsmResult;
use crate::shell::command::{CommandError, PageSelector, Verb};

/// Coherent page operations the dispatcher drives.
pub trait SharedMemory {
    fn page_count(&self) -> usize;
    fn page_size(&self) -> usize;
    fn read_page(&self, page: usize) -> Result<PageRead, CoherenceError>;
    fn write_page(&self, page: usize, bytes: &[u8]) -> Result<(), CoherenceError>;
    fn page_state(&self, page: usize) -> Result<PageState, CoherenceError>;
}

impl SharedMemory for CoherenceEngine {
    fn page_count(&self) -> usize {
        CoherenceEngine::page_count(self)
    }

    fn page_size(&self) -> usize {
        self.region().page_size()
    }

    fn read_page(&self, page: usize) -> Result<PageRead, CoherenceError> {
        self.read(page)
    }

    fn write_page(&self, page: usize, bytes: &[u8]) -> Result<(), CoherenceError> {
        self.write(page, bytes)
    }

    fn page_state(&self, page: usize) -> Result<PageState, CoherenceError> {
        self.state(page)
    }
}

/// Page text as shown to the operator: bytes up to the first NUL.
pub fn page_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Drives operator commands against a [`SharedMemory`].
pub struct Dispatcher<'a, M: SharedMemory + ?Sized> {
    memory: &'a M,
}

impl<'a, M: SharedMemory + ?Sized> Dispatcher<'a, M> {
    pub fn new(memory: &'a M) -> Self {
        Self { memory }
    }

    /// Run until the operator quits or input ends.
    pub fn run<R: BufRead, W: Write>(&self, mut input: R, mut output: W) -> DsmResult<()> {
        let pages = self.memory.page_count();
        loop {
            let Some(line) = prompt(
                &mut input,
                &mut output,
                " > Which command should I run? (r:read, w:write, v:view msi array, q:quit): ",
            )?
            else {
                return Ok(());
            };
            let verb = match line.parse::<Verb>() {
                Ok(Verb::Quit) => return Ok(()),
                Ok(verb) => verb,
                Err(err) => {
                    reject(&mut output, &err)?;
                    continue;
                }
            };

            let Some(line) = prompt(
                &mut input,
                &mut output,
                &format!(" > For which page? (0-{}, or -1 for all): ", pages.saturating_sub(1)),
            )?
            else {
                return Ok(());
            };
            let selector = match PageSelector::parse(&line, pages) {
                Ok(selector) => selector,
                Err(err) => {
                    reject(&mut output, &err)?;
                    continue;
                }
            };

            match verb {
                Verb::Write => {
                    let Some(message) = prompt(&mut input, &mut output, " > Type your new message: ")?
                    else {
                        return Ok(());
                    };
                    self.write(selector, &message)?;
                    self.read(selector, &mut output)?;
                }
                Verb::Read => self.read(selector, &mut output)?,
                Verb::Inspect => self.inspect(selector, &mut output)?,
                Verb::Quit => return Ok(()),
            }
        }
    }

    /// Store `message` in every selected page, keeping a terminating NUL.
    pub fn write(&self, selector: PageSelector, message: &str) -> DsmResult<()> {
        let limit = self.memory.page_size().saturating_sub(1);
        let bytes = message.as_bytes();
        let bytes = &bytes[..bytes.len().min(limit)];
        for page in selector.pages(self.memory.page_count()) {
            debug!("writing {} bytes to page {page}", bytes.len());
            self.memory.write_page(page, bytes)?;
        }
        Ok(())
    }

    /// Print the contents of every selected page.
    pub fn read<W: Write>(&self, selector: PageSelector, output: &mut W) -> DsmResult<()> {
        for page in selector.pages(self.memory.page_count()) {
            match self.memory.read_page(page)? {
                PageRead::Data(bytes) => {
                    writeln!(output, " [*] Page {page}:\n{}", page_text(&bytes))?
                }
                PageRead::Empty => writeln!(output, " [*] Page {page}: (empty)")?,
            }
        }
        Ok(())
    }

    /// Print the coherence state of every selected page.
    pub fn inspect<W: Write>(&self, selector: PageSelector, output: &mut W) -> DsmResult<()> {
        for page in selector.pages(self.memory.page_count()) {
            writeln!(output, " Page {page}: {}", self.memory.page_state(page)?)?;
        }
        Ok(())
    }
}

/// Print `text`, then read one line without its line ending. `None` on EOF.
fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, text: &str) -> DsmResult<Option<String>> {
    write!(output, "{text}")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}

fn reject<W: Write>(output: &mut W, err: &CommandError) -> DsmResult<()> {
    debug!("rejected operator input: {err}");
    writeln!(output, " ! {err}")?;
    Ok(())
}

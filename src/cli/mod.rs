// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.2
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Peer process bootstrap: parse arguments, join the peer, run the shell.

pub mod args;

use std::io::{self, BufRead, Write};
use std::process;
use std::thread;

use clap::Parser;
use log::{error, info};

use crate::cli::args::Cli;
use crate::error::DsmResult;
use crate::node::Node;
use crate::shell::Dispatcher;

/// Entry point for the `cohdsm` binary.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config();
    info!(
        "peer on port {} pairing with {}:{}",
        config.listen_port, config.peer_host, config.peer_port
    );

    let stdin = io::stdin();
    let mut node = Node::bootstrap(&config, || ask_page_count(&mut stdin.lock(), &mut io::stdout()))?;
    if let Some(failures) = node.take_failures() {
        thread::Builder::new()
            .name("dsm-supervisor".into())
            .spawn(move || {
                if let Ok(err) = failures.recv() {
                    error!("fatal: {err}");
                    eprintln!("Error: {err}");
                    process::exit(1);
                }
            })?;
    }

    let engine = node.engine();
    Dispatcher::new(engine.as_ref()).run(stdin.lock(), io::stdout())?;

    info!("{} done: {:?}", node.role(), engine.stats());
    if let Some(faults) = node.faults_resolved() {
        info!("{faults} page faults resolved");
    }
    Ok(())
}

/// Ask the operator for a page count until a positive number arrives.
pub fn ask_page_count<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> DsmResult<usize> {
    loop {
        write!(output, "How many pages would you like to allocate (greater than 0)? ")?;
        output.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no page count given").into());
        }
        match line.trim().parse::<usize>() {
            Ok(pages) if pages > 0 => return Ok(pages),
            _ => writeln!(output, " ! please enter a whole number greater than 0")?,
        }
    }
}

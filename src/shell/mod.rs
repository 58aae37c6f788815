pub mod command_parser;
pub mod command_processor;
pub mod executor;
pub mod job_control;
pub mod signal_handler;
pub mod status;

use anyhow::Result;
use log::{debug, warn};
use std::io::{self, Write};
use std::sync::Arc;

use crate::config::Config;
use crate::terminal::{self, LineSource};
use self::command_parser::CommandParser;
use self::command_processor::{CommandProcessor, Flow};
use self::job_control::JobControl;
use self::signal_handler::SignalHandler;
use self::status::ExitStatus;

/// State that outlives a single command: the last reaped exit status and the
/// background jobs still to be reaped.
pub struct Session {
    pub last_status: ExitStatus,
    pub jobs: JobControl,
    pub config: Arc<Config>,
}

impl Session {
    pub fn new(config: Arc<Config>) -> Self {
        Session {
            last_status: ExitStatus::default(),
            jobs: JobControl::new(),
            config,
        }
    }
}

pub struct Shell {
    input: Box<dyn LineSource>,
    command_processor: CommandProcessor,
    session: Session,
}

impl Shell {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let input = terminal::open(&config)?;
        Ok(Shell {
            input,
            command_processor: CommandProcessor::new(),
            session: Session::new(config),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let stdout = io::stdout();

        let result = loop {
            let mut out = stdout.lock();
            match self.run_cycle(&mut out) {
                Ok(Flow::Continue) => continue,
                Ok(Flow::Exit) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        // Jobs are dealt with even when the loop died on an error
        self.session.jobs.shutdown(self.session.config.on_exit);
        result
    }

    /// One prompt: re-arm signals, report finished background jobs, then
    /// read, parse and dispatch a single line.
    fn run_cycle(&mut self, out: &mut dyn Write) -> Result<Flow> {
        if let Err(e) = SignalHandler::initialize() {
            warn!("Failed to ignore SIGINT: {}", e);
        }

        self.session
            .jobs
            .check_background(&mut self.session.last_status, out)?;
        out.flush()?;

        let input = match self.input.read_line(&self.session.config.prompt)? {
            Some(input) => input,
            None => {
                debug!("End of input");
                writeln!(out)?;
                writeln!(out, "Exiting shell...")?;
                return Ok(Flow::Exit);
            }
        };

        let line = match CommandParser::parse(&input) {
            Ok(line) => line,
            Err(e) => {
                writeln!(out, "smallsh: {:#}", e)?;
                return Ok(Flow::Continue);
            }
        };

        let flow = self
            .command_processor
            .dispatch(&line, &mut self.session, out)?;
        out.flush()?;
        Ok(flow)
    }
}

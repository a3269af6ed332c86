//! Interactive parameter entry.
//!
//! Every prompt loops until it gets a usable answer. End of input is an error,
//! not an endless loop.

use std::{
    io::{self, BufRead, Write},
    str::FromStr,
};

use seqprobe_core::ErrorPolicy;

use crate::cli::{RunParams, parse_behaviour};

const BEHAVIOUR_PROMPT: &str = "Select a behaviour option: \n\n\
                                (1) Stop at the first missed payload\n\
                                (2) Count the missed payload\n\n\
                                Option: ";

/// Terminal prompter over any line reader and writer.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    /// Prompt on `output`, read answers from `input`.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Ask for every run parameter in order.
    pub fn run_params(&mut self) -> io::Result<RunParams> {
        Ok(RunParams {
            host: self.text("Broker Address: ")?,
            port: self.number("Port: ", |port: &u16| *port != 0)?,
            topic_prefix: self.text("Topic prefix: ")?,
            client_count: self.number("Number of clients: ", |n: &u32| *n > 0)?,
            publish_ms: self.number("Publish time (ms): ", |ms: &u64| *ms > 0)?,
            run_secs: self.number("Run time (s): ", |s: &u64| *s > 0)?,
            policy: self.behaviour()?,
        })
    }

    /// Non-blank text, trimmed.
    pub fn text(&mut self, prompt: &str) -> io::Result<String> {
        loop {
            let line = self.ask(prompt)?;
            if !line.is_empty() {
                return Ok(line);
            }
            writeln!(self.output, "Invalid value. Try again.")?;
        }
    }

    /// A number satisfying `valid`.
    pub fn number<T: FromStr>(&mut self, prompt: &str, valid: impl Fn(&T) -> bool) -> io::Result<T> {
        loop {
            match self.ask(prompt)?.parse::<T>() {
                Ok(value) if valid(&value) => return Ok(value),
                _ => writeln!(self.output, "Invalid value. Please enter a valid integer.")?,
            }
        }
    }

    /// Behaviour option. An empty answer keeps the default (count).
    pub fn behaviour(&mut self) -> io::Result<ErrorPolicy> {
        loop {
            let line = self.ask(BEHAVIOUR_PROMPT)?;
            if line.is_empty() {
                return Ok(ErrorPolicy::default());
            }
            if let Some(policy) = parse_behaviour(&line) {
                return Ok(policy);
            }
            writeln!(self.output, "Invalid value. Please enter a valid behaviour option.\n")?;
        }
    }

    /// Block until Enter (or end of input).
    pub fn pause(&mut self) -> io::Result<()> {
        write!(self.output, "Press Enter to close")?;
        self.output.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(())
    }

    fn ask(&mut self, prompt: &str) -> io::Result<String> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed while prompting"));
        }
        Ok(line.trim().to_string())
    }
}

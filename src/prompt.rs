// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Interactive input
//!
//! The resolver only talks to a [`Prompter`]; the terminal implementation
//! lives here, with a scripted one for tests.

#[cfg(test)]
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use crate::{LauncherError, Result};

/// Line-oriented question/answer channel
pub trait Prompter {
    /// Show an informational line
    fn say(&mut self, message: &str);

    /// Ask a yes/no question; a blank answer picks `default`
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool>;

    /// Ask for a line of text, echoed as typed
    fn ask(&mut self, question: &str) -> Result<String>;

    /// Ask for a line of text without echoing it
    fn ask_secret(&mut self, question: &str) -> Result<String>;
}

/// Interpret a yes/no answer. `None` means the answer was not understood.
pub fn parse_yes_no(answer: &str, default: bool) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

fn yes_no_hint(default: bool) -> &'static str {
    if default { "[Y/n]" } else { "[y/N]" }
}

/// Prompter on stdin, with questions written to stderr
pub struct TerminalPrompter {
    input: io::StdinLock<'static>,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self { input: io::stdin().lock() }
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self.input.read_line(&mut line)?;
        if read == 0 {
            return Err(LauncherError::Prompt("input closed".to_string()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn show(&self, question: &str) -> Result<()> {
        let mut err = io::stderr().lock();
        write!(err, "{} ", question)?;
        err.flush()?;
        Ok(())
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for TerminalPrompter {
    fn say(&mut self, message: &str) {
        eprintln!("{}", message);
    }

    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        loop {
            self.show(&format!("{} {}", question, yes_no_hint(default)))?;
            let answer = self.read_line()?;
            match parse_yes_no(&answer, default) {
                Some(value) => return Ok(value),
                None => eprintln!("Please answer y or n."),
            }
        }
    }

    fn ask(&mut self, question: &str) -> Result<String> {
        self.show(question)?;
        self.read_line()
    }

    fn ask_secret(&mut self, question: &str) -> Result<String> {
        self.show(question)?;
        let answer = {
            let _echo = EchoGuard::disable();
            self.read_line()
        };
        // The user's Enter was swallowed along with the echo
        eprintln!();
        answer
    }
}

/// Turns terminal echo off for stdin and restores it on drop
struct EchoGuard {
    #[cfg(unix)]
    saved: Option<libc::termios>,
}

impl EchoGuard {
    #[cfg(unix)]
    fn disable() -> Self {
        let fd = libc::STDIN_FILENO;
        // SAFETY: termios is plain data and tcgetattr fills it before use
        unsafe {
            if libc::isatty(fd) != 1 {
                return Self { saved: None };
            }
            let mut term: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &mut term) != 0 {
                return Self { saved: None };
            }
            let saved = term;
            term.c_lflag &= !libc::ECHO;
            if libc::tcsetattr(fd, libc::TCSANOW, &term) != 0 {
                return Self { saved: None };
            }
            Self { saved: Some(saved) }
        }
    }

    #[cfg(not(unix))]
    fn disable() -> Self {
        tracing::warn!("Cannot hide input on this platform; keys will be echoed");
        Self {}
    }
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(saved) = self.saved.take() {
            // SAFETY: restoring the attributes captured in `disable`
            unsafe {
                libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &saved);
            }
        }
    }
}

/// Prompter fed from a fixed list of answers.
///
/// Everything a terminal user would see is appended to a transcript,
/// including echoed answers. Secret answers are not echoed.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    transcript: String,
}

#[cfg(test)]
impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            transcript: String::new(),
        }
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Answers not consumed yet
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next(&mut self, question: &str) -> Result<String> {
        self.transcript.push_str(question);
        self.transcript.push(' ');
        self.answers
            .pop_front()
            .ok_or_else(|| LauncherError::Prompt(format!("no scripted answer for {:?}", question)))
    }
}

#[cfg(test)]
impl Prompter for ScriptedPrompter {
    fn say(&mut self, message: &str) {
        self.transcript.push_str(message);
        self.transcript.push('\n');
    }

    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        loop {
            let answer = self.next(&format!("{} {}", question, yes_no_hint(default)))?;
            self.transcript.push_str(&answer);
            self.transcript.push('\n');
            match parse_yes_no(&answer, default) {
                Some(value) => return Ok(value),
                None => self.say("Please answer y or n."),
            }
        }
    }

    fn ask(&mut self, question: &str) -> Result<String> {
        let answer = self.next(question)?;
        self.transcript.push_str(&answer);
        self.transcript.push('\n');
        Ok(answer)
    }

    fn ask_secret(&mut self, question: &str) -> Result<String> {
        let answer = self.next(question)?;
        self.transcript.push('\n');
        Ok(answer)
    }
}

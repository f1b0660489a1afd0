// src/ui.rs

//! User-facing output
//!
//! The engine reports progress through the `Ui` trait and only depends on the
//! answer of `confirm`. Diagnostics go to `tracing` instead.

use console::{StyledObject, style};
use dialoguer::Confirm;
use std::cell::RefCell;
use tracing::warn;

/// Severity of a user-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Success,
}

impl Level {
    fn tag(&self) -> StyledObject<&'static str> {
        match self {
            Level::Info => style("[I]").cyan().bold(),
            Level::Warn => style("[W]").yellow().bold(),
            Level::Error => style("[E]").red().bold(),
            Level::Success => style("[S]").green().bold(),
        }
    }
}

pub trait Ui {
    fn message(&self, level: Level, msg: &str);

    /// Ask a yes/no question, `true` means proceed
    fn confirm(&self, prompt: &str) -> bool;

    fn info(&self, msg: &str) {
        self.message(Level::Info, msg);
    }

    fn warn(&self, msg: &str) {
        self.message(Level::Warn, msg);
    }

    fn error(&self, msg: &str) {
        self.message(Level::Error, msg);
    }

    fn success(&self, msg: &str) {
        self.message(Level::Success, msg);
    }
}

/// Colored terminal output; warnings and errors go to stderr
pub struct ConsoleUi {
    assume_yes: bool,
}

impl ConsoleUi {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Ui for ConsoleUi {
    fn message(&self, level: Level, msg: &str) {
        match level {
            Level::Error | Level::Warn => eprintln!("{} {}", level.tag(), msg),
            _ => println!("{} {}", level.tag(), msg),
        }
    }

    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }

        let prompt = format!("{} {}", style("[?]").magenta().bold(), prompt);
        match Confirm::new().with_prompt(prompt).default(true).interact() {
            Ok(answer) => answer,
            Err(e) => {
                // no terminal to answer on
                warn!("Cannot ask for confirmation: {}", e);
                false
            }
        }
    }
}

/// Collects messages in memory and answers every prompt the same way
pub struct MemoryUi {
    answer: bool,
    messages: RefCell<Vec<(Level, String)>>,
}

impl MemoryUi {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            messages: RefCell::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.borrow().clone()
    }

    /// True if any message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.borrow().iter().any(|(_, m)| m.contains(needle))
    }
}

impl Ui for MemoryUi {
    fn message(&self, level: Level, msg: &str) {
        self.messages.borrow_mut().push((level, msg.to_string()));
    }

    fn confirm(&self, prompt: &str) -> bool {
        self.messages
            .borrow_mut()
            .push((Level::Info, format!("? {prompt}")));
        self.answer
    }
}

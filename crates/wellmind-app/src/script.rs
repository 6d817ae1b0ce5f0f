//! Timed input scripts for the headless driver.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;
use wellmind_core::{Command, JamCause};

/// Something to do at a point in simulated time.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    /// A typed player command.
    Command { command: Command },
    /// A command in the historical `name(args...)` form.
    Named {
        name: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// An overflow reported by a spillover resolver.
    Jam { cause: JamCause, index: usize },
    EndSession,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScriptEntry {
    /// Simulated second at which the event fires.
    pub at: f64,
    #[serde(flatten)]
    pub event: ScriptEvent,
}

/// Entries ordered by time; fired in order as the clock passes them.
#[derive(Debug, Default)]
pub struct Script {
    entries: Vec<ScriptEntry>,
    next: usize,
}

impl Script {
    pub fn from_entries(mut entries: Vec<ScriptEntry>) -> Result<Self> {
        if let Some(bad) = entries.iter().find(|entry| !entry.at.is_finite() || entry.at < 0.0) {
            bail!("script entry time {} must be a non-negative number", bad.at);
        }
        entries.sort_by(|a, b| a.at.total_cmp(&b.at));
        Ok(Self { entries, next: 0 })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        let entries: Vec<ScriptEntry> = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse script {}", path.display()))?;
        Self::from_entries(entries)
    }

    /// Events whose time is at or before `now` that have not fired yet.
    pub fn due(&mut self, now: f64) -> Vec<ScriptEvent> {
        let start = self.next;
        while self
            .entries
            .get(self.next)
            .is_some_and(|entry| entry.at <= now)
        {
            self.next += 1;
        }
        self.entries[start..self.next]
            .iter()
            .map(|entry| entry.event.clone())
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.entries.len() - self.next
    }
}

//! Statistics sinks for rule actions.

use crate::action::Action;

/// Receives every action the scheduler produces.
pub trait StatisticsSink {
    fn record(&mut self, step: u64, action: &Action);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatisticsSink for NullSink {
    fn record(&mut self, _step: u64, _action: &Action) {}
}

/// Keeps every action in memory, tagged with its step.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ActionLog {
    entries: Vec<(u64, Action)>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[(u64, Action)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn at_step(&self, step: u64) -> impl Iterator<Item = &Action> {
        self.entries
            .iter()
            .filter(move |(s, _)| *s == step)
            .map(|(_, a)| a)
    }

    pub fn count_where(&self, pred: impl Fn(&Action) -> bool) -> usize {
        self.entries.iter().filter(|(_, a)| pred(a)).count()
    }
}

impl StatisticsSink for ActionLog {
    fn record(&mut self, step: u64, action: &Action) {
        self.entries.push((step, action.clone()));
    }
}

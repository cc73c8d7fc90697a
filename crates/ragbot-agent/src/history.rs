//! Rolling conversation memory.

use std::collections::VecDeque;

/// The last `rounds` (human, ai) exchanges.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    rounds: usize,
    exchanges: VecDeque<(String, String)>,
}

impl ChatHistory {
    pub fn new(rounds: usize) -> Self {
        Self {
            rounds,
            exchanges: VecDeque::with_capacity(rounds),
        }
    }

    /// Record one exchange, evicting the oldest beyond the window.
    pub fn push(&mut self, human: impl Into<String>, ai: impl Into<String>) {
        self.exchanges.push_back((human.into(), ai.into()));
        while self.exchanges.len() > self.rounds {
            self.exchanges.pop_front();
        }
    }

    /// Replace the history wholesale.
    pub fn load<I, H, A>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (H, A)>,
        H: Into<String>,
        A: Into<String>,
    {
        self.exchanges.clear();
        for (human, ai) in pairs {
            self.push(human, ai);
        }
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn exchanges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.exchanges.iter().map(|(h, a)| (h.as_str(), a.as_str()))
    }

    /// Transcript lines as they appear in the conversation prompt.
    pub fn render(&self) -> String {
        self.exchanges
            .iter()
            .map(|(human, ai)| format!("Human: {}\nAI: {}", human, ai))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

//! Rule-based polarity scoring for financial headlines.

use std::collections::{HashMap, HashSet};

pub trait PolarityScorer: Send + Sync {
    /// Polarity of `text` in [-1, 1]; 0 when nothing is recognised.
    fn polarity(&self, text: &str) -> f64;
}

pub struct FinancialLexicon {
    words: HashMap<&'static str, f64>,
    negations: HashSet<&'static str>,
    intensifiers: HashMap<&'static str, f64>,
}

impl Default for FinancialLexicon {
    fn default() -> Self {
        Self::new()
    }
}

impl FinancialLexicon {
    pub fn new() -> Self {
        let words: HashMap<&'static str, f64> = [
            ("bullish", 0.8),
            ("surge", 0.7),
            ("rally", 0.7),
            ("soar", 0.8),
            ("gain", 0.5),
            ("profit", 0.6),
            ("profitable", 0.6),
            ("growth", 0.6),
            ("grow", 0.5),
            ("rise", 0.5),
            ("increase", 0.5),
            ("improve", 0.5),
            ("outperform", 0.7),
            ("beat", 0.6),
            ("exceed", 0.6),
            ("strong", 0.5),
            ("positive", 0.5),
            ("optimistic", 0.6),
            ("confident", 0.5),
            ("record", 0.6),
            ("upgrade", 0.6),
            ("boost", 0.6),
            ("buy", 0.5),
            ("breakout", 0.6),
            ("recovery", 0.5),
            ("rebound", 0.5),
            ("partnership", 0.3),
            ("strategic", 0.2),
            ("success", 0.6),
            ("successful", 0.6),
            ("excellent", 0.8),
            ("great", 0.6),
            ("good", 0.4),
            ("upbeat", 0.6),
            ("bearish", -0.8),
            ("crash", -0.9),
            ("plunge", -0.8),
            ("drop", -0.6),
            ("fall", -0.5),
            ("decline", -0.6),
            ("loss", -0.6),
            ("decrease", -0.5),
            ("weak", -0.5),
            ("negative", -0.5),
            ("pessimistic", -0.6),
            ("concern", -0.5),
            ("worry", -0.5),
            ("fear", -0.6),
            ("risk", -0.3),
            ("volatile", -0.3),
            ("uncertainty", -0.5),
            ("miss", -0.6),
            ("disappoint", -0.7),
            ("underperform", -0.6),
            ("downgrade", -0.6),
            ("sell", -0.5),
            ("selloff", -0.7),
            ("slump", -0.7),
            ("recession", -0.8),
            ("correction", -0.4),
            ("crisis", -0.8),
            ("warning", -0.5),
            ("trouble", -0.6),
            ("fail", -0.7),
            ("lawsuit", -0.6),
            ("fraud", -0.9),
            ("bad", -0.5),
            ("terrible", -0.9),
        ]
        .into_iter()
        .collect();

        let negations: HashSet<&'static str> = [
            "not", "no", "never", "neither", "nor", "none", "cannot", "cant", "dont", "doesnt",
            "didnt", "wont", "wouldnt", "shouldnt", "couldnt", "isnt", "arent", "wasnt", "werent",
            "hardly", "barely", "without",
        ]
        .into_iter()
        .collect();

        let intensifiers: HashMap<&'static str, f64> = [
            ("very", 1.5),
            ("extremely", 2.0),
            ("highly", 1.5),
            ("significantly", 1.5),
            ("sharply", 1.6),
            ("dramatically", 1.8),
            ("massively", 1.8),
            ("slightly", 0.5),
            ("somewhat", 0.7),
            ("marginally", 0.5),
        ]
        .into_iter()
        .collect();

        Self {
            words,
            negations,
            intensifiers,
        }
    }

    /// Looks a token up directly, then through common inflections ("boosts", "surged", "rising").
    fn lookup(&self, token: &str) -> Option<f64> {
        if let Some(&s) = self.words.get(token) {
            return Some(s);
        }

        let candidates = [
            token.strip_suffix('s').map(str::to_string),
            token.strip_suffix("es").map(str::to_string),
            token.strip_suffix("ies").map(|s| format!("{s}y")),
            token.strip_suffix('d').map(str::to_string),
            token.strip_suffix("ed").map(str::to_string),
            token.strip_suffix("ing").map(str::to_string),
            token.strip_suffix("ing").map(|s| format!("{s}e")),
        ];
        candidates
            .into_iter()
            .flatten()
            .find_map(|c| self.words.get(c.as_str()).copied())
    }
}

impl PolarityScorer for FinancialLexicon {
    fn polarity(&self, text: &str) -> f64 {
        let mut scores = Vec::new();
        let mut negate_next = false;
        let mut intensity = 1.0;

        for token in tokenize(text) {
            if self.negations.contains(token.as_str()) {
                negate_next = true;
                continue;
            }
            if let Some(&mult) = self.intensifiers.get(token.as_str()) {
                intensity = mult;
                continue;
            }

            match self.lookup(&token) {
                Some(mut score) => {
                    if negate_next {
                        score = -score;
                    }
                    scores.push(score * intensity);
                    negate_next = false;
                    intensity = 1.0;
                }
                None => {
                    intensity = 1.0;
                }
            }
        }

        if scores.is_empty() {
            return 0.0;
        }
        (scores.iter().sum::<f64>() / scores.len() as f64).clamp(-1.0, 1.0)
    }
}

/// Lowercased alphanumeric tokens; apostrophes are dropped so "don't" becomes "dont".
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.replace('\'', "").to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

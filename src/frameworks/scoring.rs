//! Signal weighting and aggregation.

use std::collections::BTreeMap;

use super::{Signal, SignalKind};

/// Confidence assigned to each kind of signal.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringTable {
    weights: BTreeMap<SignalKind, f64>,
}

impl Default for ScoringTable {
    fn default() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(SignalKind::Dependency, 0.9);
        weights.insert(SignalKind::ConfigFile, 0.8);
        weights.insert(SignalKind::Directory, 0.7);
        weights.insert(SignalKind::CodePattern, 0.85);
        Self { weights }
    }
}

impl ScoringTable {
    pub fn weight(&self, kind: SignalKind) -> f64 {
        self.weights.get(&kind).copied().unwrap_or(0.0)
    }

    pub fn with_weight(mut self, kind: SignalKind, weight: f64) -> Self {
        self.weights.insert(kind, weight.clamp(0.0, 1.0));
        self
    }
}

/// Mean of the signal confidences, clipped to [0, 1]. No signals scores 0.
pub fn aggregate_confidence(signals: &[Signal]) -> f64 {
    if signals.is_empty() {
        return 0.0;
    }
    let sum: f64 = signals.iter().map(|s| s.confidence).sum();
    (sum / signals.len() as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(kind: SignalKind, confidence: f64) -> Signal {
        Signal::new(kind, "x", confidence, "f")
    }

    #[test]
    fn test_default_weights() {
        let table = ScoringTable::default();
        assert_eq!(table.weight(SignalKind::Dependency), 0.9);
        assert_eq!(table.weight(SignalKind::ConfigFile), 0.8);
        assert_eq!(table.weight(SignalKind::Directory), 0.7);
        assert_eq!(table.weight(SignalKind::CodePattern), 0.85);
    }

    #[test]
    fn test_with_weight_clamps() {
        let table = ScoringTable::default().with_weight(SignalKind::Directory, 3.0);
        assert_eq!(table.weight(SignalKind::Directory), 1.0);
    }

    #[test]
    fn test_aggregate_is_mean() {
        let signals = vec![
            signal(SignalKind::Dependency, 0.9),
            signal(SignalKind::Directory, 0.7),
        ];
        assert!((aggregate_confidence(&signals) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_empty_is_zero() {
        assert_eq!(aggregate_confidence(&[]), 0.0);
    }

    #[test]
    fn test_aggregate_stays_in_bounds() {
        let signals = vec![signal(SignalKind::Dependency, 1.0); 5];
        let score = aggregate_confidence(&signals);
        assert!((0.0..=1.0).contains(&score));
    }
}

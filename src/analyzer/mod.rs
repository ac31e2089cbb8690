//! Multi-signal hold/exit analyzer
//!
//! Consumes the rolling tick history of an open position and produces a
//! [`HoldDecision`]: whether to keep holding, how far to extend the hold
//! deadline, and the suggested exit-tier plan. The analyzer only recommends -
//! execution is the gateway's job, and nothing here mutates a position.

pub mod history;

use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::AnalyzerConfig;
use history::TickHistory;

/// Signal families feeding the hold decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Volume,
    Momentum,
    Pattern,
    Whale,
}

/// One fired signal with strength on 0-100
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub strength: f64,
    pub description: String,
}

/// Partial profit-taking step: sell `sell_pct` of the position once gain
/// reaches `gain_pct`
#[derive(Debug, Clone, Serialize)]
pub struct ExitTier {
    pub gain_pct: f64,
    pub sell_pct: f64,
    pub reason: String,
}

/// Analyzer output for one tick
#[derive(Debug, Clone, Serialize)]
pub struct HoldDecision {
    pub should_hold: bool,
    pub extend_minutes: u64,
    /// Mean strength of fired signals, 0 when none fired (0-100)
    pub confidence: f64,
    pub signals: Vec<Signal>,
    pub suggested_exit_tiers: Vec<ExitTier>,
}

/// The multi-signal analyzer
pub struct SignalAnalyzer {
    config: AnalyzerConfig,
}

impl SignalAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn short_window(&self) -> Duration {
        Duration::from_secs(self.config.short_window_secs)
    }

    pub fn medium_window(&self) -> Duration {
        Duration::from_secs(self.config.medium_window_secs)
    }

    /// Evaluate one open position at `now`.
    ///
    /// `gain_pct` is the position's current unrealized gain in percent.
    pub fn evaluate(&self, history: &TickHistory, gain_pct: f64, now: Instant) -> HoldDecision {
        let mut signals = Vec::with_capacity(4);

        if let Some(signal) = self.volume_signal(history, now) {
            signals.push(signal);
        }
        if let Some(signal) = self.momentum_signal(history, gain_pct, now) {
            signals.push(signal);
        }
        if let Some(signal) = self.pattern_signal(history, now) {
            signals.push(signal);
        }
        if let Some(signal) = self.whale_signal(history, now) {
            signals.push(signal);
        }

        let confidence = if signals.is_empty() {
            0.0
        } else {
            signals.iter().map(|s| s.strength).sum::<f64>() / signals.len() as f64
        };

        let (should_hold, extend_minutes) = bracket_decision(gain_pct, confidence);
        let suggested_exit_tiers = self.exit_tiers(confidence);

        HoldDecision {
            should_hold,
            extend_minutes,
            confidence,
            signals,
            suggested_exit_tiers,
        }
    }

    /// Volume rate-of-change versus the preceding window
    fn volume_signal(&self, history: &TickHistory, now: Instant) -> Option<Signal> {
        let window = self.short_window();
        let previous = history.previous_window_volume(now, window);
        if previous <= 0.0 {
            return None;
        }

        let recent = history.window_volume(now, window);
        let roc = (recent - previous) / previous;

        if roc > self.config.volume_acceleration_rate {
            Some(Signal {
                kind: SignalKind::Volume,
                strength: (roc * 100.0).min(100.0),
                description: format!("volume accelerating at {:.0}%", roc * 100.0),
            })
        } else {
            None
        }
    }

    /// Short-window momentum early on; an is-accelerating check once the
    /// gain passes the configured breakpoint
    fn momentum_signal(&self, history: &TickHistory, gain_pct: f64, now: Instant) -> Option<Signal> {
        if gain_pct < self.config.momentum_gain_breakpoint_pct {
            let change = history.price_change(now, self.short_window())?;
            if change > self.config.short_term_gain {
                return Some(Signal {
                    kind: SignalKind::Momentum,
                    strength: (change * 500.0).min(100.0),
                    description: format!("strong early momentum: +{:.1}%", change * 100.0),
                });
            }
            return None;
        }

        // Later stage: momentum counts only if the short window is still
        // outpacing the medium window per unit time
        let short = history.price_change(now, self.short_window())?;
        let medium = history.price_change(now, self.medium_window())?;
        let ratio = self.config.medium_window_secs as f64 / self.config.short_window_secs as f64;

        if short > 0.0 && short * ratio > medium {
            Some(Signal {
                kind: SignalKind::Momentum,
                strength: 70.0,
                description: "momentum still accelerating after initial pump".to_string(),
            })
        } else {
            None
        }
    }

    /// Chart patterns: fires when at least two of higher-lows, consolidation
    /// and volume compression are present
    fn pattern_signal(&self, history: &TickHistory, now: Instant) -> Option<Signal> {
        let window = self.medium_window();
        let mut patterns = Vec::new();

        if history.higher_lows(now, window, 3) {
            patterns.push("higher_lows");
        }
        if history.is_consolidating(now, self.short_window(), 0.1) {
            patterns.push("consolidation");
        }
        if history.volume_compression(now, self.short_window()) {
            patterns.push("volume_compression");
        }

        if patterns.len() >= 2 {
            Some(Signal {
                kind: SignalKind::Pattern,
                strength: (patterns.len() as f64 * 30.0).min(100.0),
                description: format!("bullish patterns: {}", patterns.join(", ")),
            })
        } else {
            None
        }
    }

    /// Whale accumulation: share of window volume from whale-sized trades
    fn whale_signal(&self, history: &TickHistory, now: Instant) -> Option<Signal> {
        let window = self.short_window();
        let total = history.window_volume(now, window);
        if total <= 0.0 {
            return None;
        }

        let ratio = history.whale_window_volume(now, window) / total;
        if ratio > self.config.whale_volume_share {
            Some(Signal {
                kind: SignalKind::Whale,
                strength: (ratio * 150.0).min(100.0),
                description: format!("whale accumulation: {:.0}% of volume", ratio * 100.0),
            })
        } else {
            None
        }
    }

    /// Exit-tier preset, chosen solely by confidence
    fn exit_tiers(&self, confidence: f64) -> Vec<ExitTier> {
        if confidence > self.config.aggressive_confidence {
            // Aggressive: four ascending tiers, 20% moon bag
            vec![
                tier(200.0, 20.0, "initial profit taking"),
                tier(400.0, 20.0, "secure more gains"),
                tier(600.0, 20.0, "lock in 6x"),
                tier(1000.0, 20.0, "take 10x profits"),
            ]
        } else if confidence > self.config.balanced_confidence {
            // Balanced: three tiers, 25% residual
            vec![
                tier(100.0, 25.0, "take initial 2x"),
                tier(300.0, 25.0, "secure 4x gains"),
                tier(500.0, 25.0, "lock in 6x"),
            ]
        } else {
            // Conservative: full exit, no residual
            vec![
                tier(50.0, 33.0, "early profit taking"),
                tier(100.0, 33.0, "secure 2x"),
                tier(200.0, 34.0, "full exit at 3x"),
            ]
        }
    }
}

fn tier(gain_pct: f64, sell_pct: f64, reason: &str) -> ExitTier {
    ExitTier {
        gain_pct,
        sell_pct,
        reason: reason.to_string(),
    }
}

/// Hold/extend decision bracketed by current gain.
///
/// The confidence required to keep holding rises with the bracket (the
/// opportunity cost of sitting on a larger unrealized gain), and within a
/// bracket the extension is non-decreasing in confidence.
fn bracket_decision(gain_pct: f64, confidence: f64) -> (bool, u64) {
    if gain_pct < 100.0 {
        (confidence > 40.0, if confidence > 60.0 { 15 } else { 10 })
    } else if gain_pct < 300.0 {
        (confidence > 50.0, if confidence > 70.0 { 10 } else { 5 })
    } else if gain_pct < 500.0 {
        (confidence > 60.0, if confidence > 80.0 { 10 } else { 3 })
    } else {
        (confidence > 70.0, 5)
    }
}

#[cfg(test)]
mod tests {
    use super::history::TickSample;
    use super::*;
    use crate::config::AnalyzerConfig;
    use std::time::{Duration, Instant};

    fn analyzer() -> SignalAnalyzer {
        SignalAnalyzer::new(test_config())
    }

    fn test_config() -> AnalyzerConfig {
        crate::config::Config::default().analyzer
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn sample(at: Instant, price: f64, volume: f64, whale: f64) -> TickSample {
        TickSample {
            at,
            price,
            volume,
            whale_volume: whale,
        }
    }

    #[test]
    fn test_no_signals_means_zero_confidence() {
        let base = Instant::now();
        let mut history = TickHistory::new(secs(60));
        // Flat price, flat volume
        for i in 0..12 {
            history.record(sample(base + secs(i * 5), 1.0, 10.0, 0.0));
        }

        let decision = analyzer().evaluate(&history, 10.0, base + secs(60));
        assert_eq!(decision.confidence, 0.0);
        assert!(!decision.should_hold);
    }

    #[test]
    fn test_volume_acceleration_fires() {
        let base = Instant::now();
        let mut history = TickHistory::new(secs(60));
        // Previous 30s: 20 SOL, recent 30s: 60 SOL -> ROC 2.0
        history.record(sample(base, 1.0, 10.0, 0.0));
        history.record(sample(base + secs(20), 1.0, 10.0, 0.0));
        history.record(sample(base + secs(35), 1.0, 30.0, 0.0));
        history.record(sample(base + secs(55), 1.0, 30.0, 0.0));

        let decision = analyzer().evaluate(&history, 10.0, base + secs(60));
        assert!(decision
            .signals
            .iter()
            .any(|s| s.kind == SignalKind::Volume && s.strength == 100.0));
    }

    #[test]
    fn test_early_momentum_fires() {
        let base = Instant::now();
        let mut history = TickHistory::new(secs(60));
        // +20% over the short window, gain still early-stage
        history.record(sample(base + secs(31), 1.0, 1.0, 0.0));
        history.record(sample(base + secs(58), 1.2, 1.0, 0.0));

        let decision = analyzer().evaluate(&history, 10.0, base + secs(60));
        let momentum = decision
            .signals
            .iter()
            .find(|s| s.kind == SignalKind::Momentum)
            .expect("momentum should fire");
        assert_eq!(momentum.strength, 100.0);
    }

    #[test]
    fn test_late_stage_momentum_needs_acceleration() {
        let base = Instant::now();
        let mut history = TickHistory::new(secs(60));
        // Short-window rate outpaces the medium-window rate
        history.record(sample(base, 1.34, 0.0, 0.0));
        history.record(sample(base + secs(35), 1.36, 0.0, 0.0));
        history.record(sample(base + secs(58), 1.50, 0.0, 0.0));

        // Past the breakpoint the early-momentum path is off; the
        // is-accelerating check fires at fixed strength
        let decision = analyzer().evaluate(&history, 150.0, base + secs(60));
        let momentum = decision
            .signals
            .iter()
            .find(|s| s.kind == SignalKind::Momentum)
            .expect("momentum should fire");
        assert_eq!(momentum.strength, 70.0);

        // 100-300% bracket at confidence 70: hold, but only the small extension
        assert!(decision.should_hold);
        assert_eq!(decision.extend_minutes, 5);
    }

    #[test]
    fn test_late_stage_fading_momentum_is_silent() {
        let base = Instant::now();
        let mut history = TickHistory::new(secs(60));
        // Strong early move, flat short window: no longer accelerating
        history.record(sample(base, 1.00, 0.0, 0.0));
        history.record(sample(base + secs(20), 1.48, 0.0, 0.0));
        history.record(sample(base + secs(35), 1.50, 0.0, 0.0));
        history.record(sample(base + secs(58), 1.50, 0.0, 0.0));

        let decision = analyzer().evaluate(&history, 150.0, base + secs(60));
        assert!(!decision
            .signals
            .iter()
            .any(|s| s.kind == SignalKind::Momentum));
    }

    #[test]
    fn test_whale_share_fires() {
        let base = Instant::now();
        let mut history = TickHistory::new(secs(60));
        history.record(sample(base + secs(40), 1.0, 10.0, 6.0));
        history.record(sample(base + secs(50), 1.0, 10.0, 2.0));

        let decision = analyzer().evaluate(&history, 10.0, base + secs(60));
        let whale = decision
            .signals
            .iter()
            .find(|s| s.kind == SignalKind::Whale)
            .expect("whale should fire");
        // 8/20 = 40% of volume, strength = 0.4 * 150
        assert!((whale.strength - 60.0).abs() < 1.0);
    }

    #[test]
    fn test_pattern_needs_two() {
        let base = Instant::now();
        let mut history = TickHistory::new(secs(60));
        // Higher lows across 60s AND volume compression in the short window,
        // price staying in a tight band late for consolidation as well
        let points = [
            (1u64, 1.00, 40.0),
            (10, 1.02, 40.0),
            (21, 1.05, 40.0),
            (30, 1.06, 5.0),
            (41, 1.08, 5.0),
            (50, 1.09, 2.0),
            (55, 1.08, 2.0),
            (58, 1.09, 2.0),
        ];
        for (offset, price, volume) in points {
            history.record(sample(base + secs(offset), price, volume, 0.0));
        }

        let decision = analyzer().evaluate(&history, 10.0, base + secs(60));
        let pattern = decision
            .signals
            .iter()
            .find(|s| s.kind == SignalKind::Pattern)
            .expect("pattern should fire");
        assert!(pattern.strength >= 60.0);
    }

    #[test]
    fn test_exit_tier_sums_bounded() {
        let analyzer = analyzer();
        for confidence in [0.0, 30.0, 55.0, 65.0, 75.0, 95.0] {
            let tiers = analyzer.exit_tiers(confidence);
            let total: f64 = tiers.iter().map(|t| t.sell_pct).sum();
            assert!(
                total <= 100.0,
                "preset at confidence {} sells {}%",
                confidence,
                total
            );
        }
    }

    #[test]
    fn test_exit_presets_by_confidence() {
        let analyzer = analyzer();

        let aggressive = analyzer.exit_tiers(85.0);
        assert_eq!(aggressive.len(), 4);
        assert_eq!(aggressive.iter().map(|t| t.sell_pct).sum::<f64>(), 80.0);

        let balanced = analyzer.exit_tiers(60.0);
        assert_eq!(balanced.len(), 3);
        assert_eq!(balanced.iter().map(|t| t.sell_pct).sum::<f64>(), 75.0);

        let conservative = analyzer.exit_tiers(20.0);
        assert_eq!(conservative.len(), 3);
        assert_eq!(conservative.iter().map(|t| t.sell_pct).sum::<f64>(), 100.0);
    }

    #[test]
    fn test_preset_independent_of_gain() {
        // The preset is a function of confidence alone: an empty history
        // (confidence 0) yields the conservative plan at any gain
        let analyzer = analyzer();
        let history = TickHistory::new(secs(60));
        let now = Instant::now();

        let plans: Vec<Vec<ExitTier>> = [10.0, 250.0, 450.0, 900.0]
            .iter()
            .map(|&gain| analyzer.evaluate(&history, gain, now).suggested_exit_tiers)
            .collect();

        for plan in &plans {
            assert_eq!(plan.len(), 3);
            assert_eq!(plan.iter().map(|t| t.sell_pct).sum::<f64>(), 100.0);
            assert_eq!(plan[0].gain_pct, plans[0][0].gain_pct);
        }
    }

    #[test]
    fn test_bracket_thresholds_increase() {
        // Confidence barely above each bracket's threshold holds there but
        // not in the next bracket up
        assert!(bracket_decision(50.0, 45.0).0);
        assert!(!bracket_decision(150.0, 45.0).0);
        assert!(bracket_decision(150.0, 55.0).0);
        assert!(!bracket_decision(350.0, 55.0).0);
        assert!(bracket_decision(350.0, 65.0).0);
        assert!(!bracket_decision(600.0, 65.0).0);
        assert!(bracket_decision(600.0, 75.0).0);
    }

    #[test]
    fn test_extension_monotonic_within_bracket() {
        for gain in [0.0, 50.0, 99.9, 100.0, 200.0, 350.0, 499.0, 500.0, 900.0] {
            let mut last_extend = 0u64;
            let mut last_hold = false;
            let mut confidence = 0.0;
            while confidence <= 100.0 {
                let (hold, extend) = bracket_decision(gain, confidence);
                assert!(
                    extend >= last_extend,
                    "extension shrank at gain {} confidence {}",
                    gain,
                    confidence
                );
                assert!(hold >= last_hold, "hold flipped off as confidence rose");
                last_extend = extend;
                last_hold = hold;
                confidence += 0.5;
            }
        }
    }

    #[test]
    fn test_higher_confidence_never_extends_less() {
        // Within one bracket, confidence 80 must extend at least as far as
        // confidence 50
        for gain in [20.0, 150.0, 400.0, 700.0] {
            let (_, at_50) = bracket_decision(gain, 50.0);
            let (_, at_80) = bracket_decision(gain, 80.0);
            assert!(at_80 >= at_50);
        }
    }
}

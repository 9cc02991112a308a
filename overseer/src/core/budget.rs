//! Review spend accounting.

/// Tracks cumulative reviewer spend against a ceiling.
///
/// Once the ceiling is crossed the ledger latches: it stays exceeded for the
/// rest of the session even though costs keep being recorded for reporting.
#[derive(Debug, Clone)]
pub struct SpendLedger {
    spent: f64,
    ceiling: f64,
    exceeded: bool,
}

impl SpendLedger {
    pub fn new(ceiling: f64) -> Self {
        Self {
            spent: 0.0,
            ceiling,
            exceeded: false,
        }
    }

    /// Record a call's cost. Returns `true` exactly once, on the call that
    /// crosses the ceiling.
    pub fn record(&mut self, cost: f64) -> bool {
        self.spent += cost;
        if !self.exceeded && self.spent >= self.ceiling {
            self.exceeded = true;
            return true;
        }
        false
    }

    pub fn is_exceeded(&self) -> bool {
        self.exceeded
    }

    pub fn spent(&self) -> f64 {
        self.spent
    }
}

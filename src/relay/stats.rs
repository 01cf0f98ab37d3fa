/// Result of one polling cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// The cycle did not run: a dependency was unavailable or the loop was
    /// cancelled before the batch was fetched.
    pub skipped: bool,
    pub selected: usize,
    pub done: usize,
    pub failed: usize,
    /// Transitions the store could not persist. Those records stay pending.
    pub save_failures: usize,
}

impl CycleReport {
    pub fn skipped_cycle() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    pub fn is_idle(&self) -> bool {
        self.selected == 0
    }
}

/// Totals accumulated by a running loop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub cycles: usize,
    pub skipped_cycles: usize,
    pub cycle_errors: usize,
    pub messages_done: usize,
    pub messages_failed: usize,
    pub save_failures: usize,
}

impl WorkerStats {
    pub fn record(&mut self, report: &CycleReport) {
        if report.skipped {
            self.skipped_cycles += 1;
        }
        self.messages_done += report.done;
        self.messages_failed += report.failed;
        self.save_failures += report.save_failures;
    }
}

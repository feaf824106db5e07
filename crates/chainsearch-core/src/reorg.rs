//! Chain head regression detection for the live progress policy.
//!
//! Confirmation depth is a safety margin only. If the node reports a head
//! lower than one seen before, blocks may have been re-orged away. When the
//! new safe head falls below a checkpoint this run already advanced, the
//! indexed data for those blocks can no longer be trusted and the run fails
//! fast instead of continuing.

use crate::error::IndexerError;

/// Tracks the highest chain head observed by a live progress service.
#[derive(Debug, Clone)]
pub struct HeadMonitor {
    /// Highest head seen so far.
    highest_seen: Option<u64>,
    /// Last checkpoint advanced during this run.
    last_advanced: Option<u64>,
    confirmation_depth: u64,
}

impl HeadMonitor {
    pub fn new(confirmation_depth: u64) -> Self {
        Self {
            highest_seen: None,
            last_advanced: None,
            confirmation_depth,
        }
    }

    /// Record a checkpoint advanced by this run.
    pub fn advanced(&mut self, block: u64) {
        self.last_advanced = Some(block);
    }

    /// Check a freshly fetched head against previous observations.
    pub fn observe(&mut self, head: u64) -> Result<(), IndexerError> {
        if let Some(previous) = self.highest_seen {
            if head < previous {
                let safe_head = head.checked_sub(self.confirmation_depth);
                if let Some(checkpoint) = self.last_advanced {
                    if safe_head.map_or(true, |safe| safe < checkpoint) {
                        tracing::error!(
                            previous_head = previous,
                            current_head = head,
                            checkpoint,
                            "Chain head regressed below processed checkpoint"
                        );
                        return Err(IndexerError::ChainReorg {
                            previous_head: previous,
                            current_head: head,
                            checkpoint,
                        });
                    }
                }
                tracing::warn!(
                    previous_head = previous,
                    current_head = head,
                    "Chain head decreased, possible RPC inconsistency"
                );
                return Ok(());
            }
        }
        self.highest_seen = Some(head);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increasing_heads_are_accepted() {
        let mut mon = HeadMonitor::new(12);
        mon.observe(100).unwrap();
        mon.observe(100).unwrap();
        mon.observe(105).unwrap();
    }

    #[test]
    fn small_regression_is_tolerated() {
        let mut mon = HeadMonitor::new(2);
        mon.observe(110).unwrap();
        mon.advanced(100);
        // Safe head 105 is still above the checkpoint
        mon.observe(107).unwrap();
    }

    #[test]
    fn regression_below_checkpoint_fails() {
        let mut mon = HeadMonitor::new(2);
        mon.observe(110).unwrap();
        mon.advanced(108);
        let err = mon.observe(106).unwrap_err();
        assert!(matches!(
            err,
            IndexerError::ChainReorg {
                previous_head: 110,
                current_head: 106,
                checkpoint: 108
            }
        ));
    }

    #[test]
    fn regression_before_any_advance_is_tolerated() {
        let mut mon = HeadMonitor::new(0);
        mon.observe(50).unwrap();
        mon.observe(40).unwrap();
    }
}

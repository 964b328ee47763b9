//! # Pause Gate
//!
//! A circuit breaker per [`PausableRegion`]. Every mutating entry point
//! names its region and is refused while that region is paused, before any
//! state is touched.

use std::collections::BTreeSet;

use bazaar_core::{Address, PausableRegion};

use crate::error::SettlementError;

/// The set of paused regions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PauseGate {
    paused: BTreeSet<PausableRegion>,
}

impl PauseGate {
    /// A gate with `regions` paused.
    pub fn with_paused(regions: &[PausableRegion]) -> Self {
        Self {
            paused: regions.iter().copied().collect(),
        }
    }

    /// Whether `region` is paused.
    pub fn is_paused(&self, region: PausableRegion) -> bool {
        self.paused.contains(&region)
    }

    /// Fail with [`SettlementError::RegionPaused`] if `region` is paused.
    pub fn require_unpaused(&self, region: PausableRegion) -> Result<(), SettlementError> {
        if self.is_paused(region) {
            return Err(SettlementError::RegionPaused(region));
        }
        Ok(())
    }

    /// Check that `caller` is the configured pauser.
    pub fn require_pauser(caller: &Address, pauser: &Address) -> Result<(), SettlementError> {
        if pauser.is_zero() || caller != pauser {
            tracing::warn!(caller = %caller, "pause control rejected");
            return Err(SettlementError::Unauthorized {
                caller: *caller,
                action: "change paused regions",
            });
        }
        Ok(())
    }

    /// Pause `regions`, or every region when the list is empty. Returns the
    /// regions that were affected.
    pub fn pause(&mut self, regions: &[PausableRegion]) -> Vec<PausableRegion> {
        let targets = Self::targets(regions);
        self.paused.extend(targets.iter().copied());
        targets
    }

    /// Unpause `regions`, or every region when the list is empty. Returns
    /// the regions that were affected.
    pub fn unpause(&mut self, regions: &[PausableRegion]) -> Vec<PausableRegion> {
        let targets = Self::targets(regions);
        for region in &targets {
            self.paused.remove(region);
        }
        targets
    }

    /// Currently paused regions, in declaration order.
    pub fn paused_regions(&self) -> Vec<PausableRegion> {
        self.paused.iter().copied().collect()
    }

    fn targets(regions: &[PausableRegion]) -> Vec<PausableRegion> {
        let set: BTreeSet<PausableRegion> = if regions.is_empty() {
            PausableRegion::all().iter().copied().collect()
        } else {
            regions.iter().copied().collect()
        };
        set.into_iter().collect()
    }
}

use crate::host::{DeviceData, TesterRelease};

/// Releases per-device locked variables at the end of a cycle.
///
/// Releasing with no storage attached is a no-op, and a second release in
/// the same cycle does nothing: the handle is detached by the first one.
#[derive(Default)]
pub struct DeviceDataReleaser {
    storage: Option<Box<dyn DeviceData>>,
    released: bool,
}

impl DeviceDataReleaser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches storage for the current cycle, replacing any earlier handle.
    pub fn attach(&mut self, storage: Box<dyn DeviceData>) {
        self.storage = Some(storage);
        self.released = false;
    }

    pub fn is_attached(&self) -> bool {
        self.storage.is_some()
    }

    /// Returns whether locked variables were actually released.
    pub fn release(&mut self) -> bool {
        match self.storage.take() {
            Some(mut storage) => {
                storage.release_variables();
                self.released = true;
                tracing::debug!("device data variables released");
                true
            }
            None => false,
        }
    }

    /// Whether any storage was released since the last attach.
    pub fn released(&self) -> bool {
        self.released
    }
}

/// Single-fire record of a tester release within one cycle.
///
/// The latch is set before the release action runs, so the action itself
/// already observes `fired() == true`. Every call still invokes the action
/// unless it is suppressed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseLatch {
    fired: bool,
}

impl ReleaseLatch {
    pub fn reset(&mut self) {
        self.fired = false;
    }

    pub fn fire(&mut self, action: &mut dyn TesterRelease, suppress: bool) {
        self.fired = true;
        if suppress {
            tracing::debug!("tester release suppressed (sync_par)");
            return;
        }
        action.release_tester();
    }

    pub fn fired(&self) -> bool {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::ReleaseCounter;

    #[test]
    fn release_without_storage_is_a_no_op() {
        let mut releaser = DeviceDataReleaser::new();
        assert!(!releaser.release());
        assert!(!releaser.release());
        assert!(!releaser.released());
    }

    #[test]
    fn second_release_does_not_double_free() {
        let counter = ReleaseCounter::new();
        let mut releaser = DeviceDataReleaser::new();
        releaser.attach(Box::new(counter.clone()));
        assert!(releaser.is_attached());
        assert!(releaser.release());
        assert!(!releaser.release());
        assert_eq!(counter.count(), 1);
        assert!(releaser.released());
        assert!(!releaser.is_attached());
    }

    #[test]
    fn latch_stays_set_across_repeated_fires() {
        let counter = ReleaseCounter::new();
        let mut action = counter.clone();
        let mut latch = ReleaseLatch::default();
        assert!(!latch.fired());
        latch.fire(&mut action, false);
        latch.fire(&mut action, false);
        assert!(latch.fired());
        assert_eq!(counter.count(), 2);
        latch.reset();
        assert!(!latch.fired());
    }

    #[test]
    fn suppressed_fire_sets_latch_only() {
        let counter = ReleaseCounter::new();
        let mut action = counter.clone();
        let mut latch = ReleaseLatch::default();
        latch.fire(&mut action, true);
        assert!(latch.fired());
        assert_eq!(counter.count(), 0);
    }
}

//! Capabilities supplied by the host test executive.
//!
//! The core never reaches for process-wide state; everything it needs from
//! the tester is passed in through these traits. The `memory` submodule
//! carries in-process implementations used by the replay tool and tests.

use crate::error::Result;
use crate::site::MultiSiteValue;

/// Answers whether anything the internal setup depends on changed since
/// the previous cycle.
pub trait DependencyOracle {
    fn dependencies_unchanged(&self) -> bool;
}

/// A binary pass/fail test known to the host.
pub trait FunctionalDescriptor {
    fn name(&self) -> &str;
    fn evaluate(&mut self, passed: &MultiSiteValue<bool>) -> Result<()>;
}

/// A limit-checked numeric test known to the host.
///
/// A limit of `None` is absent; `Some(f64::NAN)` is a present limit that
/// never fails a comparison.
pub trait ParametricDescriptor {
    fn name(&self) -> &str;
    fn low_limit(&self) -> Option<f64>;
    fn set_low_limit(&mut self, limit: Option<f64>);
    fn high_limit(&self) -> Option<f64>;
    fn set_high_limit(&mut self, limit: Option<f64>);
    fn evaluate(&mut self, values: &MultiSiteValue<f64>) -> Result<()>;
    /// Per-site outcome of the most recent `evaluate`.
    fn pass_fail(&self) -> MultiSiteValue<bool>;
}

/// Outcome of a functional measurement as reported by the instrument.
pub trait MeasurementResult {
    fn has_passed(&self) -> MultiSiteValue<bool>;
}

/// Per-device storage holding locked variables until the cycle ends.
pub trait DeviceData {
    fn release_variables(&mut self);
}

/// Hands exclusive tester resources back to the host.
pub trait TesterRelease {
    fn release_tester(&mut self);
}

pub mod memory {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::site::{SiteId, SiteSet};

    /// Active sites that tests and the replay tool can change at any time.
    #[derive(Debug, Clone, Default)]
    pub struct SharedSites {
        sites: Rc<RefCell<Vec<SiteId>>>,
    }

    impl SharedSites {
        pub fn new(sites: &[SiteId]) -> Self {
            Self {
                sites: Rc::new(RefCell::new(sites.to_vec())),
            }
        }

        pub fn set(&self, sites: &[SiteId]) {
            *self.sites.borrow_mut() = sites.to_vec();
        }
    }

    impl SiteSet for SharedSites {
        fn active_sites(&self) -> Vec<SiteId> {
            self.sites.borrow().clone()
        }
    }

    /// Dependency oracle with a switchable answer and a consultation count.
    #[derive(Debug, Clone, Default)]
    pub struct FixedDependencies {
        unchanged: Rc<Cell<bool>>,
        consulted: Rc<Cell<usize>>,
    }

    impl FixedDependencies {
        pub fn new(unchanged: bool) -> Self {
            Self {
                unchanged: Rc::new(Cell::new(unchanged)),
                consulted: Rc::new(Cell::new(0)),
            }
        }

        pub fn set_unchanged(&self, unchanged: bool) {
            self.unchanged.set(unchanged);
        }

        pub fn consulted(&self) -> usize {
            self.consulted.get()
        }
    }

    impl DependencyOracle for FixedDependencies {
        fn dependencies_unchanged(&self) -> bool {
            self.consulted.set(self.consulted.get() + 1);
            self.unchanged.get()
        }
    }

    #[derive(Debug, Clone)]
    pub struct RecordedFunctional {
        name: String,
        pub evaluations: Vec<MultiSiteValue<bool>>,
    }

    impl RecordedFunctional {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                evaluations: Vec::new(),
            }
        }

        pub fn last_evaluation(&self) -> Option<&MultiSiteValue<bool>> {
            self.evaluations.last()
        }
    }

    impl FunctionalDescriptor for RecordedFunctional {
        fn name(&self) -> &str {
            &self.name
        }

        fn evaluate(&mut self, passed: &MultiSiteValue<bool>) -> Result<()> {
            self.evaluations.push(passed.clone());
            Ok(())
        }
    }

    /// Limits seen by the descriptor when it was evaluated.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct EvaluatedLimits {
        pub low: Option<f64>,
        pub high: Option<f64>,
    }

    /// Parametric descriptor that judges like a tester: a value fails when
    /// it is strictly below a present low limit or strictly above a present
    /// high limit. NaN limits never fail.
    #[derive(Debug, Clone)]
    pub struct RecordedParametric {
        name: String,
        low: Option<f64>,
        high: Option<f64>,
        pass_fail: MultiSiteValue<bool>,
        pub evaluations: Vec<(MultiSiteValue<f64>, EvaluatedLimits)>,
    }

    impl RecordedParametric {
        pub fn new(name: &str, low: Option<f64>, high: Option<f64>) -> Self {
            Self {
                name: name.to_string(),
                low,
                high,
                pass_fail: MultiSiteValue::unset(),
                evaluations: Vec::new(),
            }
        }
    }

    impl ParametricDescriptor for RecordedParametric {
        fn name(&self) -> &str {
            &self.name
        }

        fn low_limit(&self) -> Option<f64> {
            self.low
        }

        fn set_low_limit(&mut self, limit: Option<f64>) {
            self.low = limit;
        }

        fn high_limit(&self) -> Option<f64> {
            self.high
        }

        fn set_high_limit(&mut self, limit: Option<f64>) {
            self.high = limit;
        }

        fn evaluate(&mut self, values: &MultiSiteValue<f64>) -> Result<()> {
            let (low, high) = (self.low, self.high);
            self.pass_fail = values.map(|value| {
                !(low.is_some_and(|lo| value < lo) || high.is_some_and(|hi| value > hi))
            });
            self.evaluations
                .push((values.clone(), EvaluatedLimits { low, high }));
            Ok(())
        }

        fn pass_fail(&self) -> MultiSiteValue<bool> {
            self.pass_fail.clone()
        }
    }

    #[derive(Debug, Clone)]
    pub struct FixedResult(pub MultiSiteValue<bool>);

    impl MeasurementResult for FixedResult {
        fn has_passed(&self) -> MultiSiteValue<bool> {
            self.0.clone()
        }
    }

    /// Counts how often something was released; clones share the count.
    #[derive(Debug, Clone, Default)]
    pub struct ReleaseCounter {
        count: Rc<Cell<usize>>,
    }

    impl ReleaseCounter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn count(&self) -> usize {
            self.count.get()
        }

        fn bump(&self) {
            self.count.set(self.count.get() + 1);
        }
    }

    impl DeviceData for ReleaseCounter {
        fn release_variables(&mut self) {
            self.bump();
        }
    }

    impl TesterRelease for ReleaseCounter {
        fn release_tester(&mut self) {
            self.bump();
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn recorded_parametric_treats_nan_limits_as_open() {
            let mut test = RecordedParametric::new("vdd", Some(f64::NAN), Some(f64::NAN));
            let values: MultiSiteValue<f64> = [(0, -1e9), (1, 1e9)].into_iter().collect();
            test.evaluate(&values).expect("evaluate");
            assert!(test.pass_fail().get(0).expect("site 0"));
            assert!(test.pass_fail().get(1).expect("site 1"));
        }

        #[test]
        fn shared_sites_reflect_updates() {
            let sites = SharedSites::new(&[0, 1]);
            let view = sites.clone();
            sites.set(&[2]);
            assert_eq!(view.active_sites(), vec![2]);
        }

        #[test]
        fn release_counter_clones_share_count() {
            let counter = ReleaseCounter::new();
            let mut handle = counter.clone();
            handle.release_variables();
            handle.release_tester();
            assert_eq!(counter.count(), 2);
        }
    }
}

//! Temporary removal of a parametric test's limits.
//!
//! A limit is cleared by writing a NaN limit, which the host never fails
//! against. Restoration writes back exactly what was captured, so a limit
//! that was absent stays absent rather than becoming NaN.

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::host::ParametricDescriptor;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CapturedLimits {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

impl CapturedLimits {
    /// Bit-level comparison, so a captured NaN equals a restored NaN.
    pub fn same_as(&self, other: &CapturedLimits) -> bool {
        fn bits(limit: Option<f64>) -> Option<u64> {
            limit.map(f64::to_bits)
        }
        bits(self.low) == bits(other.low) && bits(self.high) == bits(other.high)
    }
}

/// Whether a measurement equal to a limit passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    #[default]
    Inclusive,
    Exclusive,
}

impl BoundaryPolicy {
    pub fn passes(self, limits: &CapturedLimits, value: f64) -> bool {
        let below = limits.low.is_some_and(|low| match self {
            Self::Inclusive => value < low,
            Self::Exclusive => value <= low,
        });
        let above = limits.high.is_some_and(|high| match self {
            Self::Inclusive => value > high,
            Self::Exclusive => value >= high,
        });
        !(below || above)
    }
}

pub fn capture(test: &dyn ParametricDescriptor) -> CapturedLimits {
    CapturedLimits {
        low: test.low_limit(),
        high: test.high_limit(),
    }
}

pub fn clear(test: &mut dyn ParametricDescriptor) {
    test.set_low_limit(Some(f64::NAN));
    test.set_high_limit(Some(f64::NAN));
}

pub fn restore(test: &mut dyn ParametricDescriptor, captured: &CapturedLimits) {
    test.set_low_limit(captured.low);
    test.set_high_limit(captured.high);
}

/// Value reported for a site when no tester is attached: the midpoint of
/// both limits, otherwise whichever limit exists, otherwise zero.
pub fn offline_value(limits: &CapturedLimits) -> f64 {
    match (limits.low, limits.high) {
        (Some(low), Some(high)) => (high - low) / 2.0 + low,
        (Some(low), None) => low,
        (None, Some(high)) => high,
        (None, None) => 0.0,
    }
}

/// Clears a descriptor's limits for as long as the guard lives.
pub struct ClearedLimits<'a> {
    test: &'a mut dyn ParametricDescriptor,
    captured: CapturedLimits,
}

impl<'a> ClearedLimits<'a> {
    pub fn new(test: &'a mut dyn ParametricDescriptor) -> Self {
        let captured = capture(test);
        clear(test);
        Self { test, captured }
    }

    pub fn captured(&self) -> &CapturedLimits {
        &self.captured
    }
}

impl<'a> Deref for ClearedLimits<'a> {
    type Target = dyn ParametricDescriptor + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.test
    }
}

impl<'a> DerefMut for ClearedLimits<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.test
    }
}

impl Drop for ClearedLimits<'_> {
    fn drop(&mut self) {
        restore(&mut *self.test, &self.captured);
    }
}

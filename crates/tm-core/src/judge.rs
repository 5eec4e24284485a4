//! Per-site pass/fail judgement and the force-pass override.
//!
//! With force-pass active the host is always handed a passing result so the
//! device is never binned out, while the true outcome is folded into two
//! cumulative per-site flags and written to the operator log. A failure
//! latches: once a site fails any test in a cycle, later passes do not
//! clear it. A call that fails, whether on a site lookup or in the host
//! evaluation, leaves the flags as they were and logs nothing.

use serde::Serialize;

use crate::error::{Result, TmError};
use crate::host::{FunctionalDescriptor, MeasurementResult, ParametricDescriptor};
use crate::limits::{self, BoundaryPolicy, ClearedLimits};
use crate::logging::{LogLevel, Logger};
use crate::site::{MultiSiteValue, SiteId, SiteSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForcePassFlags {
    /// 1 while every test so far passed on the site, 0 once one failed.
    pub on_pass: MultiSiteValue<i64>,
    /// 0 while every test so far passed on the site, 1 once one failed.
    pub on_fail: MultiSiteValue<i64>,
}

/// Force-pass bookkeeping owned by exactly one execute cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForcePassState {
    force_pass: bool,
    generation: u64,
    flags: Option<ForcePassFlags>,
}

impl ForcePassState {
    /// Fresh state for cycle `generation`; flags start uninitialized.
    pub fn new(force_pass: bool, generation: u64) -> Self {
        Self {
            force_pass,
            generation,
            flags: None,
        }
    }

    /// Starts every site passing: pass flag 1, fail flag 0.
    pub fn initialize(&mut self, sites: &[SiteId]) {
        self.flags = Some(ForcePassFlags {
            on_pass: MultiSiteValue::for_sites(sites, 1),
            on_fail: MultiSiteValue::for_sites(sites, 0),
        });
    }

    pub fn is_active(&self) -> bool {
        self.force_pass
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn flags(&self) -> Option<&ForcePassFlags> {
        self.flags.as_ref()
    }

    /// The flags after folding in one test's outcomes. Nothing is stored
    /// until [`commit`](Self::commit), which the judge only does once the
    /// host evaluation succeeded.
    fn fold(&self, outcomes: &[(SiteId, bool)]) -> Result<ForcePassFlags> {
        let current = self.flags.as_ref().ok_or(TmError::FlagsNotInitialized)?;
        let mut next = current.clone();
        for &(site, passed) in outcomes {
            let on_pass = next.on_pass.get(site)? & i64::from(passed);
            let on_fail = next.on_fail.get(site)? | i64::from(!passed);
            next.on_pass.set(site, on_pass)?;
            next.on_fail.set(site, on_fail)?;
        }
        Ok(next)
    }

    fn commit(&mut self, flags: ForcePassFlags) {
        self.flags = Some(flags);
    }
}

/// Measured values for a parametric test.
#[derive(Debug, Clone, Copy)]
pub enum Measured<'a> {
    Double(&'a MultiSiteValue<f64>),
    Long(&'a MultiSiteValue<i64>),
}

/// One evaluate-and-log request.
pub enum Judgement<'a> {
    Functional {
        test: &'a mut dyn FunctionalDescriptor,
        passed: &'a MultiSiteValue<bool>,
    },
    FunctionalResult {
        test: &'a mut dyn FunctionalDescriptor,
        result: &'a dyn MeasurementResult,
    },
    Parametric {
        test: &'a mut dyn ParametricDescriptor,
        values: Measured<'a>,
    },
}

fn verdict(passed: bool) -> &'static str {
    if passed {
        "PASSED"
    } else {
        "FAILED"
    }
}

/// Evaluates tests for the active sites of one cycle.
///
/// Holds no state of its own; everything that outlives a single call lives
/// in the [`ForcePassState`] passed in.
pub struct Judge<'a> {
    sites: &'a dyn SiteSet,
    logger: &'a dyn Logger,
    boundary: BoundaryPolicy,
    generation: u64,
}

impl<'a> Judge<'a> {
    pub fn new(
        sites: &'a dyn SiteSet,
        logger: &'a dyn Logger,
        boundary: BoundaryPolicy,
        generation: u64,
    ) -> Self {
        Self {
            sites,
            logger,
            boundary,
            generation,
        }
    }

    pub fn judge(&self, state: &mut ForcePassState, judgement: Judgement<'_>) -> Result<()> {
        match judgement {
            Judgement::Functional { test, passed } => self.evaluate_functional(state, test, passed),
            Judgement::FunctionalResult { test, result } => {
                self.evaluate_functional(state, test, &result.has_passed())
            }
            Judgement::Parametric {
                test,
                values: Measured::Double(values),
            } => self.evaluate_parametric(state, test, values),
            Judgement::Parametric {
                test,
                values: Measured::Long(values),
            } => self.evaluate_parametric(state, test, &values.to_double()),
        }
    }

    pub fn evaluate_functional(
        &self,
        state: &mut ForcePassState,
        test: &mut dyn FunctionalDescriptor,
        passed: &MultiSiteValue<bool>,
    ) -> Result<()> {
        self.check_state(state)?;
        let sites = self.sites.active_sites();
        let outcomes = sites
            .iter()
            .map(|&site| passed.get(site).map(|ok| (site, ok)))
            .collect::<Result<Vec<_>>>()?;

        if state.is_active() {
            let next = state.fold(&outcomes)?;
            test.evaluate(&MultiSiteValue::for_sites(&sites, true))?;
            state.commit(next);
        } else {
            test.evaluate(passed)?;
        }

        for (site, ok) in outcomes {
            self.logger.log(
                LogLevel::Param,
                &format!("[{}]({})  : {}", site, test.name(), verdict(ok)),
            );
        }
        Ok(())
    }

    /// Under force-pass the limits are recomputed here from the captured
    /// values, then cleared for the host evaluation and put back exactly.
    /// The logged verdict is the recomputed one in that case; otherwise it
    /// is the descriptor's own.
    pub fn evaluate_parametric(
        &self,
        state: &mut ForcePassState,
        test: &mut dyn ParametricDescriptor,
        values: &MultiSiteValue<f64>,
    ) -> Result<()> {
        self.check_state(state)?;
        let sites = self.sites.active_sites();
        let measured = sites
            .iter()
            .map(|&site| values.get(site).map(|value| (site, value)))
            .collect::<Result<Vec<_>>>()?;

        let outcomes = if state.is_active() {
            let captured = limits::capture(&*test);
            let outcomes = measured
                .iter()
                .map(|&(site, value)| (site, self.boundary.passes(&captured, value)))
                .collect::<Vec<_>>();
            let next = state.fold(&outcomes)?;

            let mut cleared = ClearedLimits::new(&mut *test);
            cleared.evaluate(values)?;
            drop(cleared);
            state.commit(next);
            outcomes
        } else {
            test.evaluate(values)?;
            let pass_fail = test.pass_fail();
            measured
                .iter()
                .map(|&(site, _)| pass_fail.get(site).map(|ok| (site, ok)))
                .collect::<Result<Vec<_>>>()?
        };

        for ((site, value), (_, ok)) in measured.iter().zip(outcomes) {
            self.logger.log(
                LogLevel::Param,
                &format!("[{}]({}) {:?} : {}", site, test.name(), value, verdict(ok)),
            );
        }
        Ok(())
    }

    pub fn evaluate_parametric_long(
        &self,
        state: &mut ForcePassState,
        test: &mut dyn ParametricDescriptor,
        values: &MultiSiteValue<i64>,
    ) -> Result<()> {
        self.evaluate_parametric(state, test, &values.to_double())
    }

    fn check_state(&self, state: &ForcePassState) -> Result<()> {
        if state.generation != self.generation {
            return Err(TmError::StateReuse {
                expected: self.generation,
                found: state.generation,
            });
        }
        if state.force_pass && state.flags.is_none() {
            return Err(TmError::FlagsNotInitialized);
        }
        Ok(())
    }
}

/// Legacy numeric pass/fail code: 0 for pass, -1 for fail.
pub fn to_parametric_code(passed: &MultiSiteValue<bool>) -> MultiSiteValue<i64> {
    passed.map(|ok| if ok { 0 } else { -1 })
}

pub fn result_to_parametric_code(result: &dyn MeasurementResult) -> MultiSiteValue<i64> {
    to_parametric_code(&result.has_passed())
}

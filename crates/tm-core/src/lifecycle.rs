//! setup → update → execute for one device under test.
//!
//! Application behaviour plugs in through [`TestMethodHooks`]; every hook
//! has a default, so a method only overrides what it needs. Execute always
//! ends by releasing device data, whether the steps before it succeeded,
//! returned an error, or panicked.

use serde::Serialize;

use crate::config::TestMethodConfig;
use crate::error::{Result, TmError};
use crate::host::{
    DependencyOracle, DeviceData, FunctionalDescriptor, MeasurementResult, ParametricDescriptor,
    TesterRelease,
};
use crate::judge::{ForcePassState, Judge, Judgement, Measured};
use crate::limits::BoundaryPolicy;
use crate::logging::{log_trace, LogLevel, Logger};
use crate::params::ParameterSet;
use crate::release::{DeviceDataReleaser, ReleaseLatch};
use crate::site::{MultiSiteValue, SiteId, SiteSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Setup,
    Updated,
    Executing,
    Done,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Setup => "setup",
            Self::Updated => "updated",
            Self::Executing => "executing",
            Self::Done => "done",
        }
    }
}

/// Everything the test method borrows from the host test executive.
pub struct Host {
    pub sites: Box<dyn SiteSet>,
    pub logger: Box<dyn Logger>,
    pub dependencies: Box<dyn DependencyOracle>,
    pub tester: Box<dyn TesterRelease>,
}

impl Host {
    pub fn new(
        sites: impl SiteSet + 'static,
        logger: impl Logger + 'static,
        dependencies: impl DependencyOracle + 'static,
        tester: impl TesterRelease + 'static,
    ) -> Self {
        Self {
            sites: Box::new(sites),
            logger: Box::new(logger),
            dependencies: Box::new(dependencies),
            tester: Box::new(tester),
        }
    }
}

/// Handle passed to hooks while a cycle executes.
pub struct Cycle<'a> {
    sites: &'a dyn SiteSet,
    logger: &'a dyn Logger,
    params: &'a ParameterSet,
    force_pass: &'a mut ForcePassState,
    latch: &'a mut ReleaseLatch,
    tester: &'a mut dyn TesterRelease,
    device_data: &'a mut DeviceDataReleaser,
    boundary: BoundaryPolicy,
    generation: u64,
    sync_par: bool,
}

impl<'a> Cycle<'a> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active_sites(&self) -> Vec<SiteId> {
        self.sites.active_sites()
    }

    pub fn params(&self) -> &ParameterSet {
        self.params
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger
    }

    pub fn trace(&self, step: &str) {
        log_trace(self.logger, step);
    }

    pub fn force_pass(&self) -> &ForcePassState {
        &*self.force_pass
    }

    fn judge_with(&mut self, judgement: Judgement<'_>) -> Result<()> {
        let judge = Judge::new(self.sites, self.logger, self.boundary, self.generation);
        judge.judge(self.force_pass, judgement)
    }

    pub fn judge(&mut self, judgement: Judgement<'_>) -> Result<()> {
        self.judge_with(judgement)
    }

    pub fn judge_functional(
        &mut self,
        test: &mut dyn FunctionalDescriptor,
        passed: &MultiSiteValue<bool>,
    ) -> Result<()> {
        self.judge_with(Judgement::Functional { test, passed })
    }

    pub fn judge_functional_result(
        &mut self,
        test: &mut dyn FunctionalDescriptor,
        result: &dyn MeasurementResult,
    ) -> Result<()> {
        self.judge_with(Judgement::FunctionalResult { test, result })
    }

    pub fn judge_parametric(
        &mut self,
        test: &mut dyn ParametricDescriptor,
        values: &MultiSiteValue<f64>,
    ) -> Result<()> {
        self.judge_with(Judgement::Parametric {
            test,
            values: Measured::Double(values),
        })
    }

    pub fn judge_parametric_long(
        &mut self,
        test: &mut dyn ParametricDescriptor,
        values: &MultiSiteValue<i64>,
    ) -> Result<()> {
        self.judge_with(Judgement::Parametric {
            test,
            values: Measured::Long(values),
        })
    }

    /// Hands the tester back to the host. The latch is set before the
    /// release action runs; with `sync_par` only the latch is set.
    pub fn release_tester(&mut self) {
        self.latch.fire(&mut *self.tester, self.sync_par);
    }

    pub fn tester_released(&self) -> bool {
        self.latch.fired()
    }

    /// Storage released automatically when the cycle ends.
    pub fn attach_device_data(&mut self, storage: Box<dyn DeviceData>) {
        self.device_data.attach(storage);
    }

    /// Releases attached device data now; the end-of-cycle release then
    /// has nothing left to do.
    pub fn release_device_data(&mut self) -> bool {
        self.device_data.release()
    }
}

/// Application extension points, called in a fixed order by
/// [`TestMethod`].
pub trait TestMethodHooks {
    /// Expensive setup, skipped while dependencies are unchanged.
    fn internal_setup(&mut self, _params: &ParameterSet) -> Result<()> {
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        Ok(())
    }

    fn check_params(&mut self, params: &ParameterSet) -> Result<()> {
        params.check()
    }

    fn pre_body(&mut self, _cycle: &mut Cycle<'_>) -> Result<()> {
        Ok(())
    }

    fn body(&mut self, cycle: &mut Cycle<'_>) -> Result<()> {
        self.run(cycle)
    }

    fn run(&mut self, cycle: &mut Cycle<'_>) -> Result<()> {
        cycle.trace("run");
        Ok(())
    }

    fn process(&mut self, _cycle: &mut Cycle<'_>) -> Result<()> {
        Ok(())
    }

    fn process_results(&mut self, _cycle: &mut Cycle<'_>) -> Result<()> {
        Ok(())
    }
}

/// Hooks that keep every default.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaseHooks;

impl TestMethodHooks for BaseHooks {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub generation: u64,
    pub force_pass: ForcePassState,
    pub tester_released: bool,
    pub device_data_released: bool,
    pub aborted: bool,
}

/// Ends a cycle: releases device data and moves the lifecycle to `Done`,
/// either through `finish` or, if a hook panicked, when dropped.
struct ReleaseOnExit<'s> {
    releaser: DeviceDataReleaser,
    state: &'s mut LifecycleState,
    done: bool,
}

impl<'s> ReleaseOnExit<'s> {
    fn new(state: &'s mut LifecycleState) -> Self {
        *state = LifecycleState::Executing;
        Self {
            releaser: DeviceDataReleaser::new(),
            state,
            done: false,
        }
    }

    fn finish(mut self) -> bool {
        self.end();
        self.releaser.released()
    }

    fn end(&mut self) {
        if !self.done {
            self.done = true;
            self.releaser.release();
            *self.state = LifecycleState::Done;
        }
    }
}

impl Drop for ReleaseOnExit<'_> {
    fn drop(&mut self) {
        self.end();
    }
}

pub struct TestMethod<H> {
    config: TestMethodConfig,
    params: ParameterSet,
    host: Host,
    hooks: H,
    state: LifecycleState,
    generation: u64,
    latch: ReleaseLatch,
    last_cycle: Option<CycleReport>,
}

impl<H: TestMethodHooks> TestMethod<H> {
    pub fn new(config: TestMethodConfig, params: ParameterSet, host: Host, hooks: H) -> Self {
        Self {
            config,
            params,
            host,
            hooks,
            state: LifecycleState::Idle,
            generation: 0,
            latch: ReleaseLatch::default(),
            last_cycle: None,
        }
    }

    pub fn config(&self) -> &TestMethodConfig {
        &self.config
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the tester was released during the most recent cycle.
    pub fn tester_released(&self) -> bool {
        self.latch.fired()
    }

    pub fn last_cycle(&self) -> Option<&CycleReport> {
        self.last_cycle.as_ref()
    }

    fn trace(&self, step: &str) {
        log_trace(self.host.logger.as_ref(), step);
    }

    fn out_of_order(&self, operation: &'static str) -> TmError {
        TmError::OutOfOrder {
            operation,
            state: self.state.as_str(),
        }
    }

    /// Returns `true` when internal setup was skipped.
    pub fn setup(&mut self) -> Result<bool> {
        if self.state == LifecycleState::Executing {
            return Err(self.out_of_order("setup"));
        }
        self.trace("setup");
        let skipped = self.host.dependencies.dependencies_unchanged();
        if skipped {
            tracing::debug!(
                test = %self.config.test_name,
                "dependencies unchanged, skipping internal setup"
            );
        } else {
            self.trace("_setup");
            self.hooks.internal_setup(&self.params)?;
        }
        self.state = LifecycleState::Setup;
        Ok(skipped)
    }

    pub fn update(&mut self) -> Result<()> {
        if !matches!(self.state, LifecycleState::Setup | LifecycleState::Updated) {
            return Err(self.out_of_order("update"));
        }
        self.trace("update");
        self.hooks.update()?;
        self.state = LifecycleState::Updated;
        Ok(())
    }

    pub fn execute(&mut self) -> Result<CycleReport> {
        if !matches!(self.state, LifecycleState::Setup | LifecycleState::Updated) {
            return Err(self.out_of_order("execute"));
        }
        self.trace("execute");
        self.generation += 1;
        self.latch.reset();

        let mut force_pass = ForcePassState::new(self.config.force_pass, self.generation);
        let mut release = ReleaseOnExit::new(&mut self.state);
        let outcome = {
            let mut cycle = Cycle {
                sites: self.host.sites.as_ref(),
                logger: self.host.logger.as_ref(),
                params: &self.params,
                force_pass: &mut force_pass,
                latch: &mut self.latch,
                tester: self.host.tester.as_mut(),
                device_data: &mut release.releaser,
                boundary: self.config.boundary,
                generation: self.generation,
                sync_par: self.config.sync_par,
            };
            run_steps(&mut self.hooks, &mut cycle, self.config.check_params)
        };
        let device_data_released = release.finish();

        let report = CycleReport {
            generation: self.generation,
            force_pass,
            tester_released: self.latch.fired(),
            device_data_released,
            aborted: outcome.is_err(),
        };
        self.last_cycle = Some(report.clone());
        match outcome {
            Ok(()) => Ok(report),
            Err(err) => {
                self.host
                    .logger
                    .log(LogLevel::Error, &format!("execute aborted: {}", err));
                Err(err)
            }
        }
    }
}

fn run_steps<H: TestMethodHooks>(
    hooks: &mut H,
    cycle: &mut Cycle<'_>,
    check_params: bool,
) -> Result<()> {
    if check_params {
        cycle.trace("checkParams");
        hooks.check_params(cycle.params)?;
    }
    if cycle.force_pass.is_active() {
        let sites = cycle.sites.active_sites();
        tracing::debug!(?sites, "initializing force-pass flags");
        cycle.force_pass.initialize(&sites);
    }
    cycle.trace("_preBody");
    hooks.pre_body(cycle)?;
    cycle.trace("body");
    hooks.body(cycle)?;
    cycle.trace("process");
    hooks.process(cycle)?;
    cycle.trace("processResults");
    hooks.process_results(cycle)?;
    Ok(())
}

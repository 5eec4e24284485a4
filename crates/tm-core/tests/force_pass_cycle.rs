use tm_core::host::memory::{
    FixedDependencies, RecordedFunctional, RecordedParametric, ReleaseCounter, SharedSites,
};
use tm_core::{
    Cycle, Host, LogLevel, MultiSiteValue, ParameterSet, ParametricDescriptor, RecordingLogger,
    Result, SiteId, TestMethod, TestMethodConfig, TestMethodHooks,
};

/// Functional test A then parametric test B, as a production method would.
struct TwoTests {
    functional: RecordedFunctional,
    parametric: RecordedParametric,
    passed: Vec<(SiteId, bool)>,
    values: Vec<(SiteId, f64)>,
    storage: ReleaseCounter,
}

impl TwoTests {
    fn new(storage: ReleaseCounter) -> Self {
        Self {
            functional: RecordedFunctional::new("A"),
            parametric: RecordedParametric::new("B", Some(1.0), Some(5.0)),
            passed: vec![(0, true), (1, false)],
            values: vec![(0, 3.0), (1, 10.0)],
            storage,
        }
    }
}

impl TestMethodHooks for TwoTests {
    fn pre_body(&mut self, cycle: &mut Cycle<'_>) -> Result<()> {
        cycle.attach_device_data(Box::new(self.storage.clone()));
        Ok(())
    }

    fn run(&mut self, cycle: &mut Cycle<'_>) -> Result<()> {
        let passed: MultiSiteValue<bool> = self.passed.iter().copied().collect();
        cycle.judge_functional(&mut self.functional, &passed)?;
        let values: MultiSiteValue<f64> = self.values.iter().copied().collect();
        cycle.judge_parametric(&mut self.parametric, &values)
    }
}

struct Harness {
    sites: SharedSites,
    logger: RecordingLogger,
    storage: ReleaseCounter,
    method: TestMethod<TwoTests>,
}

fn harness(force_pass: bool) -> Harness {
    let sites = SharedSites::new(&[0, 1]);
    let logger = RecordingLogger::new();
    let storage = ReleaseCounter::new();
    let host = Host::new(
        sites.clone(),
        logger.clone(),
        FixedDependencies::new(false),
        ReleaseCounter::new(),
    );
    let config = TestMethodConfig {
        test_name: "dc_and_func".to_string(),
        force_pass,
        ..TestMethodConfig::default()
    };
    let method = TestMethod::new(
        config,
        ParameterSet::default(),
        host,
        TwoTests::new(storage.clone()),
    );
    Harness {
        sites,
        logger,
        storage,
        method,
    }
}

#[test]
fn force_pass_records_truth_without_binning() {
    let mut h = harness(true);
    h.method.setup().expect("setup");
    h.method.update().expect("update");
    let report = h.method.execute().expect("execute");

    let flags = report.force_pass.flags().expect("flags initialized");
    assert_eq!(flags.on_fail.get(0).expect("site 0"), 0);
    assert_eq!(flags.on_fail.get(1).expect("site 1"), 1);
    assert_eq!(flags.on_pass.get(0).expect("site 0"), 1);
    assert_eq!(flags.on_pass.get(1).expect("site 1"), 0);

    let hooks = h.method.hooks();
    let recorded = hooks.functional.last_evaluation().expect("A evaluated");
    assert!(recorded.get(1).expect("site 1 recorded"));
    assert!(hooks.parametric.pass_fail().get(1).expect("B site 1"));
    assert_eq!(hooks.parametric.low_limit(), Some(1.0));
    assert_eq!(hooks.parametric.high_limit(), Some(5.0));

    assert_eq!(
        h.logger.messages_at(LogLevel::Param),
        vec![
            "[0](A)  : PASSED".to_string(),
            "[1](A)  : FAILED".to_string(),
            "[0](B) 3.0 : PASSED".to_string(),
            "[1](B) 10.0 : FAILED".to_string(),
        ]
    );
    assert!(report.device_data_released);
    assert_eq!(h.storage.count(), 1);
}

#[test]
fn without_force_pass_host_sees_real_failures() {
    let mut h = harness(false);
    h.method.setup().expect("setup");
    let report = h.method.execute().expect("execute");

    assert!(report.force_pass.flags().is_none());
    let hooks = h.method.hooks();
    assert!(!hooks
        .functional
        .last_evaluation()
        .expect("A evaluated")
        .get(1)
        .expect("site 1"));
    assert!(!hooks.parametric.pass_fail().get(1).expect("B site 1"));
}

#[test]
fn back_to_back_cycles_start_from_clean_flags() {
    let mut h = harness(true);
    h.method.setup().expect("setup");
    h.method.execute().expect("first cycle");

    h.sites.set(&[0]);
    {
        let hooks = h.method.hooks_mut();
        hooks.passed = vec![(0, true)];
        hooks.values = vec![(0, 2.0)];
    }
    h.logger.clear();
    h.method.setup().expect("setup");
    let report = h.method.execute().expect("second cycle");

    let flags = report.force_pass.flags().expect("flags");
    assert_eq!(flags.on_fail.sites(), vec![0]);
    assert_eq!(flags.on_fail.get(0).expect("site 0"), 0);
    assert!(flags.on_fail.get(1).is_err());
    assert_eq!(report.generation, 2);
    assert!(!report.tester_released);
    assert_eq!(h.storage.count(), 2);
    assert_eq!(h.logger.messages_at(LogLevel::Param).len(), 2);
}

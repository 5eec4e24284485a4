use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tm_core::host::memory::{
    FixedDependencies, RecordedFunctional, RecordedParametric, ReleaseCounter, SharedSites,
};
use tm_core::limits::{self, CapturedLimits};
use tm_core::{
    Cycle, CycleReport, FunctionalDescriptor, Host, LogLevel, LogRecord, Logger, MultiSiteValue,
    ParameterSet, ParametricDescriptor, RecordingLogger, SiteId, TestMethod, TestMethodConfig,
    TestMethodHooks, TracingLogger,
};

/// One device cycle described as data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: TestMethodConfig,
    pub sites: Vec<SiteId>,
    #[serde(default)]
    pub dependencies_unchanged: bool,
    #[serde(default)]
    pub parameters: ParameterSet,
    #[serde(default)]
    pub release_tester: bool,
    #[serde(default)]
    pub tests: Vec<ScenarioTest>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioTest {
    Functional {
        name: String,
        #[serde(deserialize_with = "site_keyed::deserialize")]
        passed: BTreeMap<SiteId, bool>,
    },
    Parametric {
        name: String,
        #[serde(default)]
        low: Option<f64>,
        #[serde(default)]
        high: Option<f64>,
        /// Sites left out report the offline value for the limits.
        #[serde(default, deserialize_with = "site_keyed::deserialize")]
        values: BTreeMap<SiteId, f64>,
    },
    Count {
        name: String,
        #[serde(default)]
        low: Option<f64>,
        #[serde(default)]
        high: Option<f64>,
        #[serde(deserialize_with = "site_keyed::deserialize")]
        values: BTreeMap<SiteId, i64>,
    },
}

/// Per-site maps keyed by site id. YAML hands the keys over as integers,
/// JSON as strings; the tagged enum buffers both before they get here.
mod site_keyed {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use std::collections::BTreeMap;
    use tm_core::SiteId;

    #[derive(Deserialize, PartialEq, Eq, PartialOrd, Ord)]
    #[serde(untagged)]
    enum SiteKey {
        Id(SiteId),
        Text(String),
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<BTreeMap<SiteId, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        let raw = BTreeMap::<SiteKey, T>::deserialize(deserializer)?;
        let mut sites = BTreeMap::new();
        for (key, value) in raw {
            let site = match key {
                SiteKey::Id(site) => site,
                SiteKey::Text(text) => text.trim().parse::<SiteId>().map_err(|_| {
                    D::Error::custom(format!(
                        "invalid site id '{}': expected a non-negative integer",
                        text
                    ))
                })?,
            };
            if sites.insert(site, value).is_some() {
                return Err(D::Error::custom(format!("site {} listed twice", site)));
            }
        }
        Ok(sites)
    }
}

impl ScenarioTest {
    pub fn name(&self) -> &str {
        match self {
            Self::Functional { name, .. }
            | Self::Parametric { name, .. }
            | Self::Count { name, .. } => name,
        }
    }
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    let scenario: Scenario = if path.extension().and_then(|s| s.to_str()) == Some("json") {
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid scenario json: {}", path.display()))?
    } else {
        serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid scenario yaml: {}", path.display()))?
    };
    Ok(scenario)
}

pub fn parse_sites(raw: &str) -> Result<Vec<SiteId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<SiteId>()
                .map_err(|_| anyhow!("invalid site id '{}': expected a non-negative integer", part))
        })
        .collect()
}

/// Problems that would make a replay meaningless, all reported at once.
pub fn validate_scenario(scenario: &Scenario) -> Result<()> {
    let mut problems = Vec::new();
    if scenario.sites.is_empty() {
        problems.push("no active sites".to_string());
    }
    if scenario.config.check_params {
        problems.extend(scenario.parameters.problems().iter().map(ToString::to_string));
    }
    for (index, test) in scenario.tests.iter().enumerate() {
        if test.name().is_empty() {
            problems.push(format!("tests[{}]: empty name", index));
        }
        let covered: Vec<SiteId> = match test {
            ScenarioTest::Functional { passed, .. } => passed.keys().copied().collect(),
            ScenarioTest::Count { values, .. } => values.keys().copied().collect(),
            ScenarioTest::Parametric { .. } => continue,
        };
        for site in &scenario.sites {
            if !covered.contains(site) {
                problems.push(format!(
                    "tests[{}] ({}): no result for site {}",
                    index,
                    test.name(),
                    site
                ));
            }
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("scenario is invalid:\n  {}", problems.join("\n  ")))
    }
}

/// Sends every record to memory and, above the configured threshold, to
/// `tracing`.
#[derive(Clone)]
struct TeeLogger {
    recording: RecordingLogger,
    tracing: TracingLogger,
}

impl Logger for TeeLogger {
    fn log(&self, level: LogLevel, message: &str) {
        self.recording.log(level, message);
        self.tracing.log(level, message);
    }
}

enum Descriptor {
    Functional(RecordedFunctional, MultiSiteValue<bool>),
    Parametric(RecordedParametric, BTreeMap<SiteId, f64>),
    Count(RecordedParametric, MultiSiteValue<i64>),
}

struct ReplayHooks {
    descriptors: Vec<Descriptor>,
    release_tester: bool,
}

impl ReplayHooks {
    fn new(scenario: &Scenario) -> Self {
        let descriptors = scenario
            .tests
            .iter()
            .map(|test| match test {
                ScenarioTest::Functional { name, passed } => Descriptor::Functional(
                    RecordedFunctional::new(name),
                    passed.iter().map(|(site, ok)| (*site, *ok)).collect(),
                ),
                ScenarioTest::Parametric {
                    name,
                    low,
                    high,
                    values,
                } => Descriptor::Parametric(
                    RecordedParametric::new(name, *low, *high),
                    values.clone(),
                ),
                ScenarioTest::Count {
                    name,
                    low,
                    high,
                    values,
                } => Descriptor::Count(
                    RecordedParametric::new(name, *low, *high),
                    values.iter().map(|(site, v)| (*site, *v)).collect(),
                ),
            })
            .collect();
        Self {
            descriptors,
            release_tester: scenario.release_tester,
        }
    }
}

impl TestMethodHooks for ReplayHooks {
    fn run(&mut self, cycle: &mut Cycle<'_>) -> tm_core::Result<()> {
        for descriptor in &mut self.descriptors {
            match descriptor {
                Descriptor::Functional(test, passed) => cycle.judge_functional(test, passed)?,
                Descriptor::Parametric(test, values) => {
                    let offline = limits::offline_value(&limits::capture(&*test));
                    let measured: MultiSiteValue<f64> = cycle
                        .active_sites()
                        .into_iter()
                        .map(|site| (site, values.get(&site).copied().unwrap_or(offline)))
                        .collect();
                    cycle.judge_parametric(test, &measured)?;
                }
                Descriptor::Count(test, values) => cycle.judge_parametric_long(test, values)?,
            }
        }
        if self.release_tester {
            cycle.release_tester();
        }
        Ok(())
    }
}

/// What the host recorded for one test: the per-site result it was handed
/// (functional) or its own verdict (parametric).
#[derive(Debug, Clone, Serialize)]
pub struct HostRecord {
    pub name: String,
    pub passed: BTreeMap<SiteId, bool>,
    pub limits: Option<CapturedLimits>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayOutcome {
    pub report: Option<CycleReport>,
    pub error: Option<String>,
    pub setup_skipped: bool,
    pub records: Vec<LogRecord>,
    pub host: Vec<HostRecord>,
}

pub fn replay(scenario: &Scenario) -> Result<ReplayOutcome> {
    let recording = RecordingLogger::new();
    let logger = TeeLogger {
        recording: recording.clone(),
        tracing: TracingLogger::new(scenario.config.message_log_level),
    };
    let host = Host::new(
        SharedSites::new(&scenario.sites),
        logger,
        FixedDependencies::new(scenario.dependencies_unchanged),
        ReleaseCounter::new(),
    );
    let mut method = TestMethod::new(
        scenario.config.clone(),
        scenario.parameters.clone(),
        host,
        ReplayHooks::new(scenario),
    );

    let setup_skipped = method.setup().context("setup failed")?;
    method.update().context("update failed")?;
    let (report, error) = match method.execute() {
        Ok(report) => (Some(report), None),
        Err(err) => {
            tracing::warn!(code = err.stable_code(), "cycle aborted: {}", err);
            (method.last_cycle().cloned(), Some(err.to_string()))
        }
    };

    let host = method
        .hooks()
        .descriptors
        .iter()
        .filter_map(host_record)
        .collect();
    Ok(ReplayOutcome {
        report,
        error,
        setup_skipped,
        records: recording
            .records()
            .into_iter()
            .filter(|record| record.level != LogLevel::MethodTrace)
            .collect(),
        host,
    })
}

fn host_record(descriptor: &Descriptor) -> Option<HostRecord> {
    match descriptor {
        Descriptor::Functional(test, _) => {
            let evaluated = test.last_evaluation()?;
            Some(HostRecord {
                name: test.name().to_string(),
                passed: evaluated.iter().collect(),
                limits: None,
            })
        }
        Descriptor::Parametric(test, _) | Descriptor::Count(test, _) => {
            test.evaluations.last()?;
            Some(HostRecord {
                name: test.name().to_string(),
                passed: test.pass_fail().iter().collect(),
                limits: Some(limits::capture(test)),
            })
        }
    }
}

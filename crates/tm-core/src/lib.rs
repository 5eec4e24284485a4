//! Execution core of an ATE test method: the per-device setup/update/execute
//! lifecycle, multi-site pass/fail judgement with force-pass override, and
//! guaranteed end-of-cycle resource release.

pub mod config;
pub mod error;
pub mod host;
pub mod judge;
pub mod lifecycle;
pub mod limits;
pub mod logging;
pub mod params;
pub mod release;
pub mod site;

pub use config::TestMethodConfig;
pub use error::{ErrorCategory, Result, TmError};
pub use host::{
    DependencyOracle, DeviceData, FunctionalDescriptor, MeasurementResult, ParametricDescriptor,
    TesterRelease,
};
pub use judge::{
    result_to_parametric_code, to_parametric_code, ForcePassFlags, ForcePassState, Judge,
    Judgement, Measured,
};
pub use lifecycle::{
    BaseHooks, Cycle, CycleReport, Host, LifecycleState, TestMethod, TestMethodHooks,
};
pub use limits::{BoundaryPolicy, CapturedLimits};
pub use logging::{LogLevel, LogRecord, Logger, RecordingLogger, TracingLogger};
pub use params::{ParameterDef, ParameterSet};
pub use release::{DeviceDataReleaser, ReleaseLatch};
pub use site::{MultiSiteValue, SiteId, SiteSet};

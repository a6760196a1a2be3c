#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod aggregator;
pub mod executor;
pub mod pool;
pub mod rinha;
pub mod scheduler;
pub mod transport;

pub(crate) mod progress;
pub(crate) mod timer;

pub use rampa_core;
pub use rampa_core::labels;

pub use aggregator::Aggregator;
pub use executor::{Context, LocalScenario, Scenario, ScenarioExecutor};
pub use load_test::{ConfigurableLoadTest, LoadTest, StopHandle};
pub use pool::{UserState, VirtualUser, VirtualUserPool};
pub use scheduler::StageScheduler;

pub mod prelude {
    pub use crate::executor::{Context, Scenario};
    pub use crate::load_test::{ConfigurableLoadTest, LoadTest, StopHandle};
    pub use crate::transport::{HttpTransport, Request, RequestError, Response, Transport};

    pub use rampa_core::labels;
    pub use rampa_core::{
        AggregateStats, MetricStats, Outcome, RunConfig, RunStatistics, Sample, Stage,
    };
}

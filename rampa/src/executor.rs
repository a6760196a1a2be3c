use crate::progress::TickCounters;
use crate::transport::{RequestError, Response};
use futures_util::FutureExt;
use governor::DefaultDirectRateLimiter;
use rampa_core::{labels, Labels, Sample};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Status code a request must answer with to count as a success.
pub const EXPECTED_STATUS: u16 = 200;

/// One iteration of user workload logic.
///
/// Implementations issue their requests through [`Context::transaction`] and return the samples
/// it hands back.
#[trait_variant::make(Scenario: Send)]
pub trait LocalScenario {
    async fn run(&self, ctx: &mut Context) -> Vec<Sample>;
}

/// Per-virtual-user execution context.
pub struct Context {
    user_id: u64,
    iteration: u64,
    rng: SmallRng,
    hooks: RequestHooks,
}

#[derive(Clone)]
pub(crate) struct RequestHooks {
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
    pub abandon: watch::Receiver<bool>,
    pub progress: Arc<TickCounters>,
}

impl RequestHooks {
    fn detached() -> Self {
        // NOTE: With the sender gone the abandon signal can never fire.
        let (_, abandon) = watch::channel(false);
        Self {
            limiter: None,
            abandon,
            progress: Arc::new(TickCounters::new()),
        }
    }
}

impl Context {
    pub(crate) fn new(user_id: u64, seed: Option<u64>, hooks: RequestHooks) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(user_seed(seed, user_id)),
            None => SmallRng::from_entropy(),
        };

        Self {
            user_id,
            iteration: 0,
            rng,
            hooks,
        }
    }

    /// A context outside of any run: no rate limit and never cancelled.
    pub fn detached(user_id: u64, seed: u64) -> Self {
        Self::new(user_id, Some(seed), RequestHooks::detached())
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Number of iterations this user has started, the current one included.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    /// Issues one request and turns its outcome into a [`Sample`].
    ///
    /// Waits on the run's rate limit first, if any. Only a `200` answer is a success; any other
    /// status or error becomes a failure sample. Nothing is retried. Once the run abandons its
    /// in-flight work the request is dropped and recorded as cancelled.
    pub async fn transaction<F>(&mut self, labels: Labels, request: F) -> Sample
    where
        F: Future<Output = Result<Response, RequestError>>,
    {
        let start = Instant::now();
        let res = {
            let limiter = self.hooks.limiter.clone();
            let abandon = &mut self.hooks.abandon;
            let issue = async move {
                if let Some(limiter) = limiter {
                    limiter.until_ready().await;
                }
                let start = Instant::now();
                (request.await, start)
            };

            tokio::select! {
                (res, issued) = issue => Some((res, issued)),
                true = abandoned(abandon) => None,
            }
        };

        let sample = match res {
            Some((Ok(response), issued)) if response.status == EXPECTED_STATUS => {
                Sample::success(labels, issued.elapsed())
            }
            Some((Ok(response), issued)) => Sample::failure(
                labels,
                issued.elapsed(),
                format!("unexpected status {}", response.status),
            ),
            Some((Err(err), issued)) => Sample::failure(labels, issued.elapsed(), err.to_string()),
            None => Sample::failure(labels, start.elapsed(), RequestError::Cancelled.to_string()),
        };

        trace!(
            user = self.user_id,
            outcome = ?sample.outcome,
            "{}",
            sample.metric_name()
        );
        self.hooks.progress.record(&sample);
        sample
    }
}

/// Resolves to `true` once the run abandons in-flight work, `false` if it never can.
async fn abandoned(rx: &mut watch::Receiver<bool>) -> bool {
    rx.wait_for(|abandoned| *abandoned).await.is_ok()
}

fn user_seed(seed: u64, user_id: u64) -> u64 {
    seed ^ user_id.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Runs single iterations of a [`Scenario`], containing any panic it raises.
pub struct ScenarioExecutor<S> {
    scenario: S,
}

impl<S> ScenarioExecutor<S> {
    pub fn new(scenario: S) -> Self {
        Self { scenario }
    }

    pub fn scenario(&self) -> &S {
        &self.scenario
    }
}

impl<S> ScenarioExecutor<S>
where
    S: Scenario + Sync,
{
    pub async fn run(&self, ctx: &mut Context) -> Vec<Sample> {
        ctx.iteration += 1;
        let start = Instant::now();

        let res = AssertUnwindSafe(self.scenario.run(ctx)).catch_unwind().await;
        ctx.hooks.progress.iteration_done();

        match res {
            Ok(samples) => samples,
            Err(panic) => {
                let reason = panic_message(&*panic);
                error!(
                    user = ctx.user_id,
                    iteration = ctx.iteration,
                    "Scenario panicked: {reason}"
                );
                let sample = Sample::failure(
                    labels! { "name" => "iteration" },
                    start.elapsed(),
                    format!("panicked: {reason}"),
                );
                ctx.hooks.progress.record(&sample);
                vec![sample]
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

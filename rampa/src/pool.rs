use crate::aggregator::Aggregator;
use crate::executor::{Context, RequestHooks, Scenario, ScenarioExecutor};
use crate::progress::TickCounters;
use futures_util::future::join_all;
use governor::DefaultDirectRateLimiter;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// How long abandoned users get to record their cancelled samples before being aborted.
const ABANDON_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UserState {
    Idle,
    Running,
    Stopping,
}

/// State shared between the pool and a user task.
///
/// `exited` is set by the task, under the channel lock, once it commits to leaving its loop. A
/// stopping user that has not exited can still be put back to work.
#[derive(Copy, Clone, Debug)]
struct Slot {
    state: UserState,
    exited: bool,
}

pub(crate) struct UserOptions {
    pub pause: Duration,
    pub seed: Option<u64>,
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

/// Handle the pool keeps on each spawned virtual user.
pub struct VirtualUser {
    id: u64,
    slot: Arc<watch::Sender<Slot>>,
    handle: JoinHandle<()>,
}

impl VirtualUser {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> UserState {
        self.slot.borrow().state
    }

    fn stop(&self) {
        self.slot.send_modify(|slot| slot.state = UserState::Stopping);
    }

    /// Cancels a pending stop. Fails once the task has committed to exiting.
    fn revive(&self) -> bool {
        self.slot.send_if_modified(|slot| {
            if slot.state == UserState::Stopping && !slot.exited {
                slot.state = UserState::Running;
                true
            } else {
                false
            }
        })
    }
}

/// Dynamic set of virtual users, each looping over a shared [`Scenario`].
///
/// Users asked to stop stay in a draining list until their task exits. Ramping up puts draining
/// users back to work before spawning new ones, so live users never outnumber the largest target
/// seen.
pub struct VirtualUserPool<S> {
    executor: Arc<ScenarioExecutor<S>>,
    aggregator: Arc<Aggregator>,
    progress: Arc<TickCounters>,
    options: UserOptions,
    abandon: watch::Sender<bool>,
    // NOTE: Ordered by id, oldest user at the front; ramp-down stops from there.
    active: VecDeque<VirtualUser>,
    draining: Vec<VirtualUser>,
    next_id: u64,
    peak: usize,
}

impl<S> VirtualUserPool<S>
where
    S: Scenario + Send + Sync + 'static,
{
    pub(crate) fn new(
        executor: Arc<ScenarioExecutor<S>>,
        aggregator: Arc<Aggregator>,
        progress: Arc<TickCounters>,
        options: UserOptions,
    ) -> Self {
        let (abandon, _) = watch::channel(false);
        Self {
            executor,
            aggregator,
            progress,
            options,
            abandon,
            active: VecDeque::new(),
            draining: vec![],
            next_id: 0,
            peak: 0,
        }
    }

    /// Moves the number of active users to `target`.
    ///
    /// Missing users are first taken back from the draining list, then spawned; excess users,
    /// oldest first, are asked to stop once their current iteration completes.
    pub fn reconcile(&mut self, target: usize) {
        self.reap();

        let current = self.active.len();
        if current < target {
            let mut revived = 0;
            let mut exiting = vec![];
            while self.active.len() < target {
                let Some(user) = self.draining.pop() else {
                    break;
                };
                if user.revive() {
                    self.active.push_back(user);
                    revived += 1;
                } else {
                    exiting.push(user);
                }
            }
            self.draining.extend(exiting);
            if revived > 0 {
                self.active.make_contiguous().sort_by_key(VirtualUser::id);
            }

            while self.active.len() < target {
                let user = self.spawn_user();
                self.active.push_back(user);
            }
            debug!("Ramped up from {current} to {target} users ({revived} revived)");
        } else if current > target {
            for user in self.active.drain(..current - target) {
                user.stop();
                self.draining.push(user);
            }
            debug!(
                "Ramped down from {current} to {target} users ({} draining)",
                self.draining.len()
            );
        }

        self.peak = self.peak.max(self.active.len());

        #[cfg(feature = "metrics")]
        metrics::gauge!(rampa_core::METRIC_LABELS.active_users).set(self.active.len() as f64);
    }

    /// Users that are idle or running, i.e. not asked to stop.
    pub fn active(&self) -> usize {
        self.active.len()
    }

    /// Users asked to stop whose task has not exited yet.
    pub fn draining(&self) -> usize {
        self.draining
            .iter()
            .filter(|u| !u.handle.is_finished())
            .count()
    }

    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn users(&self) -> impl Iterator<Item = &VirtualUser> {
        self.active.iter().chain(self.draining.iter())
    }

    pub fn stop_all(&mut self) {
        self.reconcile(0);
    }

    /// Stops every user and waits for them to exit.
    ///
    /// Users get `grace` to finish their iteration. After that their in-flight requests are
    /// abandoned (recorded as cancelled failures) and any straggler is aborted.
    pub async fn shutdown(&mut self, grace: Duration) {
        self.stop_all();

        let finished = tokio::time::timeout(grace, self.join_draining()).await;
        if finished.is_err() {
            warn!(
                "{} users still running after the {} grace period; abandoning in-flight requests",
                self.draining(),
                humantime::format_duration(grace)
            );
            self.abandon.send_replace(true);

            if tokio::time::timeout(ABANDON_TIMEOUT, self.join_draining())
                .await
                .is_err()
            {
                error!("Aborting {} unresponsive users", self.draining());
                for user in &self.draining {
                    user.handle.abort();
                }
                self.join_draining().await;
            }
        }

        self.draining.clear();
        info!("All virtual users stopped");
    }

    /// Waits for every draining task.
    ///
    /// Handles that already completed are dropped first: an earlier, timed out join may have
    /// polled them to completion, and a `JoinHandle` must not be polled again after that.
    async fn join_draining(&mut self) {
        self.reap();
        let results = join_all(self.draining.iter_mut().map(|u| &mut u.handle)).await;
        for res in results {
            if let Err(err) = res {
                if !err.is_cancelled() {
                    error!("Virtual user task failed: {err}");
                }
            }
        }
        self.draining.clear();
    }

    fn reap(&mut self) {
        self.draining.retain(|u| !u.handle.is_finished());
    }

    fn spawn_user(&mut self) -> VirtualUser {
        let id = self.next_id;
        self.next_id += 1;

        let (slot, _) = watch::channel(Slot {
            state: UserState::Idle,
            exited: false,
        });
        let slot = Arc::new(slot);
        let hooks = RequestHooks {
            limiter: self.options.limiter.clone(),
            abandon: self.abandon.subscribe(),
            progress: self.progress.clone(),
        };
        let ctx = Context::new(id, self.options.seed, hooks);

        let handle = tokio::spawn(user_loop(
            self.executor.clone(),
            ctx,
            slot.clone(),
            self.aggregator.clone(),
            self.options.pause,
        ));

        VirtualUser { id, slot, handle }
    }
}

impl<S> Drop for VirtualUserPool<S> {
    fn drop(&mut self) {
        for user in self.active.iter().chain(self.draining.iter()) {
            user.handle.abort();
        }
    }
}

async fn user_loop<S>(
    executor: Arc<ScenarioExecutor<S>>,
    mut ctx: Context,
    slot: Arc<watch::Sender<Slot>>,
    aggregator: Arc<Aggregator>,
    pause: Duration,
) where
    S: Scenario + Sync,
{
    slot.send_if_modified(|slot| {
        if slot.state == UserState::Idle {
            slot.state = UserState::Running;
            true
        } else {
            false
        }
    });
    let mut rx = slot.subscribe();
    trace!(user = ctx.user_id(), "Virtual user started");

    while !exit_if_stopping(&slot) {
        for sample in executor.run(&mut ctx).await {
            aggregator.record(sample);
        }

        if pause.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = stopping(&mut rx) => {}
        }
    }

    trace!(
        user = ctx.user_id(),
        iterations = ctx.iteration(),
        "Virtual user stopped"
    );
}

/// Marks the user as exited if it is still asked to stop. Returns whether it did.
fn exit_if_stopping(slot: &watch::Sender<Slot>) -> bool {
    slot.send_if_modified(|slot| {
        if slot.state == UserState::Stopping {
            slot.exited = true;
            true
        } else {
            false
        }
    })
}

async fn stopping(rx: &mut watch::Receiver<Slot>) {
    let _ = rx.wait_for(|slot| slot.state == UserState::Stopping).await;
}

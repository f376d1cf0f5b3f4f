use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::Result;
use super::run::RunContext;
use super::scenario::Scenario;
use super::vu::VuContext;

/// How long VUs get to notice a hard stop before they are aborted.
const HARD_STOP_GRACE: Duration = Duration::from_secs(5);

/// Identifies one spawned VU.
#[derive(Debug, Clone)]
pub struct VuHandle {
    id: u64,
    retire: CancellationToken,
}

impl VuHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

struct RunningVu {
    handle: VuHandle,
    join: JoinHandle<()>,
}

/// Owns the VU tasks of one run.
///
/// Retirement is cooperative: a retired VU finishes its current iteration and
/// exits. Only the hard stop interrupts in-flight work.
pub struct Executor<S> {
    scenario: Arc<S>,
    run: Arc<RunContext>,
    /// Most recently spawned last.
    active: Vec<RunningVu>,
    draining: Vec<JoinHandle<()>>,
    next_id: u64,
}

impl<S: Scenario> Executor<S> {
    pub fn new(scenario: Arc<S>, run: Arc<RunContext>) -> Self {
        Self {
            scenario,
            run,
            active: Vec::new(),
            draining: Vec::new(),
            next_id: 1,
        }
    }

    /// VUs that have been spawned and not retired.
    pub fn active(&self) -> u64 {
        self.active.len() as u64
    }

    /// Total VUs spawned so far.
    pub fn spawned(&self) -> u64 {
        self.next_id - 1
    }

    pub fn spawn(&mut self) -> VuHandle {
        let id = self.next_id;
        self.next_id += 1;

        let handle = VuHandle {
            id,
            retire: self.run.hard_stop.child_token(),
        };
        let vu = VuContext::new(id, self.run.clone());
        let join = tokio::spawn(vu_loop(
            self.scenario.clone(),
            vu,
            handle.retire.clone(),
        ));

        tracing::debug!(vu = id, "vu spawned");
        self.active.push(RunningVu {
            handle: handle.clone(),
            join,
        });
        handle
    }

    /// Asks `handle`'s VU to stop after its current iteration. Returns `false`
    /// if it was already retired.
    pub fn retire(&mut self, handle: VuHandle) -> bool {
        let Some(pos) = self.active.iter().position(|r| r.handle.id == handle.id) else {
            return false;
        };
        let vu = self.active.remove(pos);
        self.retire_running(vu);
        true
    }

    /// Retires the most recently spawned VU.
    pub fn retire_latest(&mut self) -> Option<VuHandle> {
        let vu = self.active.pop()?;
        let handle = vu.handle.clone();
        self.retire_running(vu);
        Some(handle)
    }

    fn retire_running(&mut self, vu: RunningVu) {
        tracing::debug!(vu = vu.handle.id, "vu retiring");
        vu.handle.retire.cancel();
        self.draining.push(vu.join);
    }

    /// Spawns or retires VUs until `target` are active. Returns
    /// `(spawned, retired)`.
    pub fn scale_to(&mut self, target: u64) -> (u64, u64) {
        let mut spawned = 0;
        let mut retired = 0;
        while self.active() < target {
            self.spawn();
            spawned += 1;
        }
        while self.active() > target {
            if self.retire_latest().is_none() {
                break;
            }
            retired += 1;
        }
        (spawned, retired)
    }

    /// Interrupts in-flight iterations of every VU.
    pub fn hard_stop(&self) {
        self.run.hard_stop.cancel();
    }

    /// Retires every VU and waits for them. After `graceful_stop` the hard
    /// stop fires; VUs that still do not exit are aborted.
    pub async fn shutdown(mut self, graceful_stop: Duration) -> Result<()> {
        while self.retire_latest().is_some() {}
        let mut pending = std::mem::take(&mut self.draining);

        let drained = tokio::time::timeout(graceful_stop, join_all(&mut pending)).await;
        let res = match drained {
            Ok(res) => res,
            Err(_) => {
                tracing::warn!(
                    remaining = pending.len(),
                    graceful_stop = ?graceful_stop,
                    "graceful stop elapsed, interrupting in-flight iterations"
                );
                self.hard_stop();
                let interrupted =
                    tokio::time::timeout(HARD_STOP_GRACE, join_all(&mut pending)).await;
                interrupted.unwrap_or_else(|_| {
                    tracing::warn!(
                        remaining = pending.len(),
                        "aborting unresponsive virtual users"
                    );
                    Ok(())
                })
            }
        };

        if res.is_err() {
            self.hard_stop();
        }
        for h in &pending {
            h.abort();
        }
        for h in pending {
            let _ = h.await;
        }
        res
    }
}

impl<S> Drop for Executor<S> {
    fn drop(&mut self) {
        for vu in &self.active {
            vu.join.abort();
        }
        for h in &self.draining {
            h.abort();
        }
    }
}

/// Awaits handles newest first, popping each once it has finished.
async fn join_all(handles: &mut Vec<JoinHandle<()>>) -> Result<()> {
    while let Some(h) = handles.last_mut() {
        let res = h.await;
        handles.pop();
        res?;
    }
    Ok(())
}

async fn vu_loop<S: Scenario>(scenario: Arc<S>, mut vu: VuContext, retire: CancellationToken) {
    let _active = vu.enter_active_vu();
    let hard_stop = vu.run.hard_stop.clone();

    while !retire.is_cancelled() {
        let started = Instant::now();
        scenario.iteration(&vu).await;

        // Interrupted iterations are not counted.
        if hard_stop.is_cancelled() {
            break;
        }
        vu.record_iteration(started.elapsed());
        vu.iteration += 1;

        // Scenarios that never block would otherwise pin the worker.
        tokio::task::yield_now().await;
    }

    tracing::debug!(vu = vu.vu_id, iterations = vu.iteration, "vu stopped");
}

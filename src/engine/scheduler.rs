//! Active-set scheduling and the neighbourhood mutual-exclusion protocol.
//!
//! A single mutex serialises the active set, the deferred-activation set,
//! the vertex states, the in-use flags and the idle count; everything that
//! blocks waits on condition variables tied to that mutex. Exclusion over
//! overlapping neighbourhoods follows the monitor solution to the dining
//! philosophers problem: a vertex program runs only once no vertex of its
//! closed neighbourhood is in use, and blocked acquirers wait on the
//! condition variable of some vertex that stood in their way.

use std::collections::HashSet;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::types::VertexId;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum VertexState {
    /// Not assigned to any worker.
    Free,
    /// Popped from the active set; its worker is waiting for the lock.
    Scheduled,
    /// Its program is executing.
    Running,
}

struct SchedShared {
    active: HashSet<VertexId>,
    deferred: HashSet<VertexId>,
    states: Box<[VertexState]>,
    in_use: Box<[bool]>,
    idle: usize,
}

pub(crate) struct Scheduler {
    shared: Mutex<SchedShared>,
    no_jobs: Condvar,
    vertex_free: Box<[Condvar]>,
    workers: usize,
}

impl Scheduler {
    pub fn new(num_vertices: usize, workers: usize) -> Self {
        Self {
            shared: Mutex::new(SchedShared {
                active: HashSet::new(),
                deferred: HashSet::new(),
                states: vec![VertexState::Free; num_vertices].into_boxed_slice(),
                in_use: vec![false; num_vertices].into_boxed_slice(),
                idle: 0,
            }),
            no_jobs: Condvar::new(),
            vertex_free: (0..num_vertices).map(|_| Condvar::new()).collect(),
            workers,
        }
    }

    /// Resets the idle count before a run; a previous run leaves every
    /// worker counted as idle.
    pub fn prepare_run(&self) {
        self.shared.lock().idle = 0;
    }

    /// Pops the next active vertex, blocking while the set is empty and
    /// some worker is still busy. Returns `None` once every worker is idle
    /// with an empty active set; that is the termination condition.
    pub fn next_job(&self) -> Option<VertexId> {
        let mut shared = self.shared.lock();
        shared.idle += 1;
        while shared.active.is_empty() && shared.idle < self.workers {
            self.no_jobs.wait(&mut shared);
        }
        if shared.active.is_empty() {
            // every worker is idle; wake the rest so they fail too. The
            // idle count stays elevated on purpose.
            self.no_jobs.notify_all();
            return None;
        }
        let vid = *shared
            .active
            .iter()
            .next()
            .expect("active set checked non-empty");
        shared.active.remove(&vid);
        shared.states[vid.index()] = VertexState::Scheduled;
        shared.idle -= 1;
        Some(vid)
    }

    /// Blocks until no vertex of `neighbourhood` is in use, then marks the
    /// whole neighbourhood in use and `vid` as running.
    pub fn acquire(&self, vid: VertexId, neighbourhood: &[VertexId]) {
        let mut shared = self.shared.lock();
        while let Some(block) = Self::blocking_vertex(&shared, neighbourhood) {
            trace!(vertex = vid.0, blocked_on = block.0, "neighbourhood busy");
            self.vertex_free[block.index()].wait(&mut shared);
        }
        for &u in neighbourhood {
            shared.in_use[u.index()] = true;
        }
        shared.states[vid.index()] = VertexState::Running;
    }

    /// Frees `vid`'s neighbourhood, wakes anyone blocked on it, and
    /// promotes a deferred activation of `vid` under the same lock hold so
    /// termination detection cannot race past it.
    pub fn release(&self, vid: VertexId, neighbourhood: &[VertexId]) {
        let mut shared = self.shared.lock();
        shared.states[vid.index()] = VertexState::Free;
        for &u in neighbourhood {
            shared.in_use[u.index()] = false;
            self.vertex_free[u.index()].notify_all();
        }
        if shared.deferred.remove(&vid) {
            shared.active.insert(vid);
            self.no_jobs.notify_one();
        }
    }

    /// Schedules `vid` for (re-)execution. Signalling an already active or
    /// deferred vertex is a no-op; a scheduled vertex is dropped because
    /// its upcoming run will see the freshest data anyway; a running vertex
    /// is deferred and replayed when its run finishes.
    pub fn signal(&self, vid: VertexId) {
        let mut shared = self.shared.lock();
        if shared.active.contains(&vid) || shared.deferred.contains(&vid) {
            return;
        }
        match shared.states[vid.index()] {
            VertexState::Free => {
                shared.active.insert(vid);
                self.no_jobs.notify_one();
            }
            VertexState::Scheduled => {}
            VertexState::Running => {
                shared.deferred.insert(vid);
            }
        }
    }

    /// Seeds every vertex. Only valid between runs, never from a vertex
    /// program.
    pub fn signal_all(&self, num_vertices: usize) {
        let mut shared = self.shared.lock();
        for i in 0..num_vertices {
            shared.active.insert(VertexId(i as u32));
        }
    }

    /// Termination invariant: after the workers exit, both sets are empty.
    pub fn assert_quiescent(&self) {
        let shared = self.shared.lock();
        assert!(
            shared.active.is_empty() && shared.deferred.is_empty(),
            "workers terminated with pending activations"
        );
    }

    fn blocking_vertex(shared: &SchedShared, neighbourhood: &[VertexId]) -> Option<VertexId> {
        neighbourhood
            .iter()
            .copied()
            .find(|u| shared.in_use[u.index()])
    }
}

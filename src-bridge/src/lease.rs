//! Ownership token for the process-wide event loop.
//!
//! The loop, its delegate slot and the activation policy are one shared
//! resource. At most one session owns it at a time; while it runs, other
//! sessions join as guests and the loop is only stopped once the owner's
//! producer and every guest task are done.

use parking_lot::{Condvar, Mutex};
use scbridge_common::LoopPhase;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaseState {
    Idle,
    Starting {
        epoch: u64,
    },
    Running {
        epoch: u64,
        guests: usize,
        owner_done: bool,
    },
    Stopping {
        epoch: u64,
    },
}

/// How a session takes part in the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    /// Starts the loop, installs its delegate and restores state afterwards.
    Owner { epoch: u64 },
    /// Schedules onto a loop some other session owns.
    Guest { epoch: u64 },
    /// Schedules onto a loop the host application runs; nothing is tracked.
    Hosted,
}

#[derive(Debug)]
struct Inner {
    state: LeaseState,
    next_epoch: u64,
}

/// Mutual exclusion for loop ownership.
#[derive(Debug)]
pub struct LoopLease {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl LoopLease {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: LeaseState::Idle,
                next_epoch: 1,
            }),
            changed: Condvar::new(),
        }
    }

    /// Decide how the caller takes part, blocking while the loop is starting or stopping.
    ///
    /// `loop_running` is consulted under the lease lock, so a loop the lease
    /// does not know about is treated as host-owned.
    pub fn acquire(&self, loop_running: impl Fn() -> bool) -> Participant {
        let mut inner = self.inner.lock();
        loop {
            match inner.state {
                LeaseState::Idle => {
                    if loop_running() {
                        return Participant::Hosted;
                    }
                    let epoch = inner.next_epoch;
                    inner.next_epoch += 1;
                    inner.state = LeaseState::Starting { epoch };
                    debug!(epoch, "Lease: idle -> starting");
                    return Participant::Owner { epoch };
                }
                LeaseState::Running {
                    epoch,
                    guests,
                    owner_done,
                } => {
                    inner.state = LeaseState::Running {
                        epoch,
                        guests: guests + 1,
                        owner_done,
                    };
                    debug!(epoch, guests = guests + 1, "Lease: guest joined");
                    return Participant::Guest { epoch };
                }
                LeaseState::Starting { .. } | LeaseState::Stopping { .. } => {
                    self.changed.wait(&mut inner);
                }
            }
        }
    }

    /// The owner's loop reported it finished launching.
    pub fn mark_running(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.state == (LeaseState::Starting { epoch }) {
            inner.state = LeaseState::Running {
                epoch,
                guests: 0,
                owner_done: false,
            };
            debug!(epoch, "Lease: starting -> running");
            self.changed.notify_all();
        } else {
            warn!(epoch, state = ?inner.state, "Lease: launch signal for a stale session");
        }
    }

    /// Record that a participant's task is done.
    ///
    /// Returns `true` when the caller is the last participant of an owned loop
    /// and must stop it; the lease then moves to stopping.
    pub fn finish(&self, participant: Participant) -> bool {
        let (done_epoch, is_owner) = match participant {
            Participant::Hosted => return false,
            Participant::Owner { epoch } => (epoch, true),
            Participant::Guest { epoch } => (epoch, false),
        };

        let mut inner = self.inner.lock();
        let LeaseState::Running {
            epoch,
            mut guests,
            mut owner_done,
        } = inner.state
        else {
            return false;
        };
        if epoch != done_epoch {
            return false;
        }

        if is_owner {
            owner_done = true;
        } else {
            guests = guests.saturating_sub(1);
        }

        if owner_done && guests == 0 {
            inner.state = LeaseState::Stopping { epoch };
            debug!(epoch, "Lease: running -> stopping");
            true
        } else {
            inner.state = LeaseState::Running {
                epoch,
                guests,
                owner_done,
            };
            false
        }
    }

    /// The owner's loop has returned; the lease is free again.
    pub fn release(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        let current = match inner.state {
            LeaseState::Idle => return,
            LeaseState::Starting { epoch: current }
            | LeaseState::Running { epoch: current, .. }
            | LeaseState::Stopping { epoch: current } => current,
        };
        if current == epoch {
            inner.state = LeaseState::Idle;
            debug!(epoch, "Lease: released");
            self.changed.notify_all();
        }
    }

    /// Current phase and guest count.
    pub fn snapshot(&self) -> (LoopPhase, usize) {
        match self.inner.lock().state {
            LeaseState::Idle => (LoopPhase::Idle, 0),
            LeaseState::Starting { .. } => (LoopPhase::Starting, 0),
            LeaseState::Running { guests, .. } => (LoopPhase::Running, guests),
            LeaseState::Stopping { .. } => (LoopPhase::Stopping, 0),
        }
    }
}

impl Default for LoopLease {
    fn default() -> Self {
        Self::new()
    }
}

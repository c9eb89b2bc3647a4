//! Per-card refresh timing.
//!
//! Every active card owns a [`RefreshTimer`]. The timer does two things:
//!
//! - every full period it reports the card as due for a full refresh by
//!   sending a [`RefreshDue`] on the host's channel;
//! - for each fast-updating component it tracks a readiness flag that turns
//!   `true` one fast period after the component was last delivered.
//!
//! The timer never calls back into the host directly. Callbacks run on runtime
//! tasks and only take the timer's own lock, so the host may hold its registry
//! lock while arming or resetting timers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use cardhost_types::{Card, ProviderId, RefreshPeriods};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::lock;
use crate::schedule::Schedule;

/// A card whose full-refresh period elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshDue {
    pub provider: ProviderId,
    pub card_id: String,
}

pub struct RefreshTimer {
    state: Arc<Mutex<TimerState>>,
}

struct TimerState {
    due: RefreshDue,
    periods: RefreshPeriods,
    due_tx: mpsc::UnboundedSender<RefreshDue>,
    /// Fast-updating ids of the armed card. `None` before `arm` and after
    /// `destroy`.
    armed: Option<Vec<String>>,
    /// Bumped on every cancel. Callbacks from an older generation do nothing.
    generation: u64,
    next_ticket: u64,
    components: HashMap<String, Readiness>,
    schedule: Schedule,
}

struct Readiness {
    ready: bool,
    /// Identifies the one-shot allowed to flip `ready`.
    ticket: u64,
    pending: Option<AbortHandle>,
}

impl RefreshTimer {
    pub(crate) fn new(
        due: RefreshDue,
        periods: RefreshPeriods,
        due_tx: mpsc::UnboundedSender<RefreshDue>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(TimerState {
                due,
                periods,
                due_tx,
                armed: None,
                generation: 0,
                next_ticket: 0,
                components: HashMap::new(),
                schedule: Schedule::default(),
            })),
        }
    }

    /// Cancel everything and start over for `card`'s current component set.
    pub fn arm(&self, card: &Card) {
        let ids = card.fast_updating_ids().map(str::to_string).collect();
        let weak = Arc::downgrade(&self.state);
        let mut state = lock(&self.state);
        state.cancel();
        state.start(&weak, ids);
    }

    /// Report the card due now and restart both cadences. No-op unless armed.
    pub fn reset(&self) {
        let weak = Arc::downgrade(&self.state);
        let mut state = lock(&self.state);
        let Some(ids) = state.armed.take() else {
            tracing::trace!("Ignoring reset of unarmed timer for '{}'", state.due.card_id);
            return;
        };
        state.signal_due();
        state.cancel();
        state.start(&weak, ids);
    }

    /// `false` for components that are not fast-updating or not armed.
    #[must_use]
    pub fn is_component_ready(&self, component_id: &str) -> bool {
        lock(&self.state)
            .components
            .get(component_id)
            .is_some_and(|readiness| readiness.ready)
    }

    /// A fresh value for `component_id` was delivered; open a new window.
    pub fn on_component_pushed(&self, component_id: &str) {
        let weak = Arc::downgrade(&self.state);
        let mut state = lock(&self.state);
        if state.armed.is_none() || !state.components.contains_key(component_id) {
            return;
        }
        state.schedule_ready(&weak, component_id.to_string());
    }

    /// Cancel everything. Only a later `arm` restarts the timer.
    pub fn destroy(&self) {
        let mut state = lock(&self.state);
        state.cancel();
        state.armed = None;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        lock(&self.state).armed.is_some()
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl TimerState {
    fn cancel(&mut self) {
        self.schedule.cancel_all();
        self.generation = self.generation.wrapping_add(1);
        self.components.clear();
    }

    fn start(&mut self, weak: &Weak<Mutex<TimerState>>, ids: Vec<String>) {
        for id in &ids {
            self.schedule_ready(weak, id.clone());
        }

        let generation = self.generation;
        let weak = weak.clone();
        self.schedule.repeating(self.periods.full(), move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let state = lock(&shared);
            if state.generation == generation {
                state.signal_due();
            }
        });
        self.armed = Some(ids);
    }

    fn schedule_ready(&mut self, weak: &Weak<Mutex<TimerState>>, component_id: String) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let generation = self.generation;
        let weak = weak.clone();
        let key = component_id.clone();

        let pending = self.schedule.once(self.periods.fast(), move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut state = lock(&shared);
            if state.generation != generation {
                return;
            }
            if let Some(readiness) = state.components.get_mut(&key)
                && readiness.ticket == ticket
            {
                readiness.ready = true;
                readiness.pending = None;
            }
        });

        let previous = self.components.insert(
            component_id,
            Readiness {
                ready: false,
                ticket,
                pending: Some(pending),
            },
        );
        if let Some(previous) = previous
            && let Some(stale) = previous.pending
        {
            stale.abort();
        }
    }

    fn signal_due(&self) {
        if self.due_tx.send(self.due.clone()).is_err() {
            tracing::debug!(
                "Refresh for '{}' of {} dropped: host is gone",
                self.due.card_id,
                self.due.provider
            );
        }
    }
}

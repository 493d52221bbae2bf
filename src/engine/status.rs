use std::sync::{Arc, Mutex};

/// Lifecycle of an engine's sound resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Loading,
    Ready,
    Error,
}

/// Handle returned by a state-change subscription; pass it back to drop the
/// listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct StateInner {
    state: EngineState,
    listeners: Vec<(u64, Box<dyn Fn(EngineState) + Send>)>,
    next_id: u64,
}

/// Shared state-transition bookkeeping.
///
/// Every engine composes one of these instead of inheriting it: it holds the
/// current [`EngineState`] and the listener registry, and notifies listeners
/// on real transitions (setting the same state twice is silent). The cell is
/// clonable and `Send` so a background loader thread can drive transitions
/// while the UI holds the same cell.
#[derive(Clone)]
pub struct StateCell {
    inner: Arc<Mutex<StateInner>>,
}

impl StateCell {
    pub fn new(initial: EngineState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StateInner {
                state: initial,
                listeners: Vec::new(),
                next_id: 0,
            })),
        }
    }

    pub fn get(&self) -> EngineState {
        self.inner.lock().unwrap().state
    }

    /// Transition to `state`, notifying listeners. No-op if unchanged.
    ///
    /// Callbacks run outside the lock, so a listener may subscribe new
    /// listeners from within its callback; an unsubscribe issued from
    /// within a callback takes effect after this notification round.
    pub fn set(&self, state: EngineState) {
        let listeners = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == state {
                return;
            }
            inner.state = state;
            std::mem::take(&mut inner.listeners)
        };

        for (_, callback) in &listeners {
            callback(state);
        }

        let mut inner = self.inner.lock().unwrap();
        let added = std::mem::replace(&mut inner.listeners, listeners);
        inner.listeners.extend(added);
    }

    pub fn subscribe(&self, callback: Box<dyn Fn(EngineState) + Send>) -> SubscriptionId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, callback));
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        let mut inner = self.inner.lock().unwrap();
        inner.listeners.retain(|(id, _)| *id != subscription.0);
    }

    /// Drop every listener (dispose path).
    pub fn clear_listeners(&self) {
        self.inner.lock().unwrap().listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn listeners_fire_on_transition() {
        let cell = StateCell::new(EngineState::Idle);
        let count = Arc::new(AtomicUsize::new(0));
        let count_in = count.clone();
        cell.subscribe(Box::new(move |_| {
            count_in.fetch_add(1, Ordering::SeqCst);
        }));

        cell.set(EngineState::Loading);
        cell.set(EngineState::Ready);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(cell.get(), EngineState::Ready);
    }

    #[test]
    fn same_state_does_not_fire() {
        let cell = StateCell::new(EngineState::Ready);
        let count = Arc::new(AtomicUsize::new(0));
        let count_in = count.clone();
        cell.subscribe(Box::new(move |_| {
            count_in.fetch_add(1, Ordering::SeqCst);
        }));

        cell.set(EngineState::Ready);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let cell = StateCell::new(EngineState::Idle);
        let count = Arc::new(AtomicUsize::new(0));
        let count_in = count.clone();
        let sub = cell.subscribe(Box::new(move |_| {
            count_in.fetch_add(1, Ordering::SeqCst);
        }));

        cell.unsubscribe(sub);
        cell.set(EngineState::Loading);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}

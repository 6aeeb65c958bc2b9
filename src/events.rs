// events.rs: named event channels with ordered listeners

use std::collections::HashMap;
use std::rc::Rc;

/// Fired with the current marker label collection whenever it is rebuilt.
pub const ON_LABELS_CHANGE: &str = "onLabelsChange";

pub type Listener<P> = Rc<dyn Fn(&P) -> anyhow::Result<()>>;

/// Minimal publish/subscribe keyed by event name.
///
/// Listeners run synchronously in the order they were added. A failing
/// listener stops the dispatch and its error is returned to the caller.
pub struct EventBus<P> {
    listeners: HashMap<String, Vec<Listener<P>>>,
}

impl<P> EventBus<P> {
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }

    pub fn add_listener(&mut self, event: &str, listener: Listener<P>) {
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push(listener);
    }

    /// Removes every registration of `listener` (compared by pointer).
    pub fn remove_listener(&mut self, event: &str, listener: &Listener<P>) {
        let Some(list) = self.listeners.get_mut(event) else {
            return;
        };
        list.retain(|l| !Rc::ptr_eq(l, listener));
        if list.is_empty() {
            self.listeners.remove(event);
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }

    pub fn dispatch(&self, event: &str, payload: &P) -> anyhow::Result<()> {
        // snapshot, listeners may hold their own handle to the bus owner
        let Some(list) = self.listeners.get(event).cloned() else {
            return Ok(());
        };
        for listener in list {
            listener(payload)?;
        }
        Ok(())
    }
}

impl<P> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

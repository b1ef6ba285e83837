/// An event stamped with the frame it was raised in.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<E> {
    pub frame_index: u64,
    pub payload: E,
}

/// Queue of engine events, drained by the host glue after each frame or
/// input handler so callbacks run outside any engine borrow.
#[derive(Debug)]
pub struct EventBus<E> {
    events: Vec<Event<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, frame_index: u64, payload: E) {
        self.events.push(Event {
            frame_index,
            payload,
        });
    }

    pub fn events(&self) -> &[Event<E>] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<Event<E>> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::EventBus;

    #[test]
    fn records_events_with_frame_index() {
        let mut bus = EventBus::new();
        bus.emit(2, "ready");
        assert_eq!(bus.events().len(), 1);
        assert_eq!(bus.events()[0].frame_index, 2);
        assert_eq!(bus.events()[0].payload, "ready");
    }

    #[test]
    fn drain_clears_events() {
        let mut bus = EventBus::new();
        bus.emit(0, 7u32);
        bus.emit(1, 8u32);
        let drained = bus.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].payload, 8);
        assert!(bus.events().is_empty());
    }
}

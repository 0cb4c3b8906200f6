use tokio::sync::broadcast;

const CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictionaryEvent {
    /// A single word became accepted.
    WordAdded(String),
    /// Words were removed; everything previously accepted must be checked again.
    RecheckAll,
}

/// Multicast of word-set changes for one dictionary.
pub struct EventBus(broadcast::Sender<DictionaryEvent>);

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        Self(sender)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DictionaryEvent> {
        self.0.subscribe()
    }

    pub fn publish(&self, event: DictionaryEvent) {
        // No subscribers is fine.
        let _ = self.0.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_every_event() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(DictionaryEvent::WordAdded("tokio".into()));
        bus.publish(DictionaryEvent::RecheckAll);

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.try_recv().unwrap(), DictionaryEvent::WordAdded("tokio".into()));
            assert_eq!(rx.try_recv().unwrap(), DictionaryEvent::RecheckAll);
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        bus.publish(DictionaryEvent::RecheckAll);
        let mut late = bus.subscribe();
        assert!(late.try_recv().is_err());
    }
}

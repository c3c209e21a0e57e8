use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const FEED_DEPTH: usize = 256;

/// Committed-event feeds, one broadcast channel per venue. Downstream
/// consumers (analytics, notifications) observe admissions after commit;
/// nothing they do can influence admission.
#[derive(Debug)]
pub struct NotifyHub {
    feeds: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            feeds: DashMap::new(),
        }
    }

    /// Follow a venue's committed events, opening the feed if needed. A
    /// consumer that falls more than `FEED_DEPTH` events behind sees
    /// `Lagged` and rejoins at the current position.
    pub fn watch(&self, venue_id: Ulid) -> broadcast::Receiver<Event> {
        self.feeds
            .entry(venue_id)
            .or_insert_with(|| broadcast::channel(FEED_DEPTH).0)
            .subscribe()
    }

    /// Publish a committed event. Dropped silently when nobody watches.
    pub fn publish(&self, venue_id: Ulid, event: &Event) {
        let Some(feed) = self.feeds.get(&venue_id) else {
            return;
        };
        let _ = feed.send(event.clone());
    }

    /// Close a venue's feed. Watchers drain what was already published,
    /// then observe `Closed`.
    pub fn retire(&self, venue_id: &Ulid) {
        self.feeds.remove(venue_id);
    }
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watch_then_publish() {
        let hub = NotifyHub::new();
        let vid = Ulid::new();
        let mut rx = hub.watch(vid);

        let event = Event::VenueRetired { id: vid };
        hub.publish(vid, &event);
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn publish_without_watchers_is_noop() {
        let hub = NotifyHub::new();
        let vid = Ulid::new();
        hub.publish(vid, &Event::VenueRetired { id: vid });
    }

    #[tokio::test]
    async fn retire_closes_the_feed_after_draining() {
        let hub = NotifyHub::new();
        let vid = Ulid::new();
        let mut rx = hub.watch(vid);

        let event = Event::VenueRetired { id: vid };
        hub.publish(vid, &event);
        hub.retire(&vid);

        assert_eq!(rx.recv().await.unwrap(), event);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}

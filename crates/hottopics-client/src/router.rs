//! The inbound router: where decoded packets go once they arrive.
//!
//! Every valid inbound packet takes two paths at once:
//!
//! ```text
//!                     ┌──→ buffer (FIFO) ──→ poll_and_remove(kind)
//! deliver(packet) ────┤
//!                     └──→ observers registered for packet.kind()
//! ```
//!
//! The buffer serves code that wants to pull one specific packet (the
//! correlator waiting for a response). Observers serve code that wants every
//! packet of a kind pushed to it (a chat view rendering `ReceiveMessage`).
//! Both see the same packet; taking it out of the buffer does not affect
//! observers, and an observer running does not remove it from the buffer.
//!
//! # Concurrency
//!
//! `deliver` is called from the connection task while consumers poll and
//! register from their own tasks. The buffer and the registry each sit
//! behind their own `parking_lot` lock, and neither lock is held while an
//! observer runs, so a callback may register or remove observers (itself
//! included) without deadlocking.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hottopics_protocol::{Packet, PacketBody, PacketKind};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

/// A callback invoked with every delivered packet of the kind it was
/// registered for.
pub type ObserverFn = dyn Fn(&Packet) + Send + Sync;

/// Handle returned by [`InboundRouter::add_observer`], used to remove the
/// observer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obs-{}", self.0)
    }
}

struct Registration {
    id: ObserverId,
    kind: PacketKind,
    callback: Arc<ObserverFn>,
}

/// Buffers inbound packets and fans them out to observers.
#[derive(Default)]
pub struct InboundRouter {
    buffer: Mutex<VecDeque<Packet>>,
    /// Wakes tasks blocked in [`wait_and_remove`](Self::wait_and_remove).
    arrivals: Notify,
    observers: RwLock<Vec<Registration>>,
    next_observer: AtomicU64,
}

impl InboundRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes one packet to the buffer and to every observer of its kind.
    ///
    /// An invalid packet is logged and dropped before either path sees it.
    /// Observers run synchronously on the caller's task, in registration
    /// order. A panicking observer is logged and skipped; the rest still
    /// run.
    pub fn deliver(&self, packet: Packet) {
        let kind = packet.kind();
        if let Err(e) = packet.validate() {
            tracing::warn!(%kind, error = %e, "dropping invalid packet");
            return;
        }

        // Snapshot so callbacks run with the registry unlocked.
        let callbacks: Vec<(ObserverId, Arc<ObserverFn>)> = self
            .observers
            .read()
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| (r.id, Arc::clone(&r.callback)))
            .collect();

        tracing::trace!(%kind, observers = callbacks.len(), "packet delivered");

        if callbacks.is_empty() {
            self.buffer.lock().push_back(packet);
            self.arrivals.notify_waiters();
            return;
        }

        self.buffer.lock().push_back(packet.clone());
        self.arrivals.notify_waiters();

        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&packet))).is_err() {
                tracing::error!(observer = %id, %kind, "observer panicked");
            }
        }
    }

    /// Removes and returns the oldest buffered packet of `kind`, if any.
    ///
    /// Packets of other kinds keep their place. Each candidate is
    /// re-validated on the way out; one that fails is discarded and the
    /// scan moves on to the next packet of `kind`.
    pub fn poll_and_remove(&self, kind: PacketKind) -> Option<Packet> {
        let mut buffer = self.buffer.lock();
        loop {
            let index = buffer.iter().position(|p| p.kind() == kind)?;
            let packet = buffer.remove(index)?;
            match packet.validate() {
                Ok(()) => return Some(packet),
                Err(e) => {
                    tracing::warn!(%kind, error = %e, "discarding invalid buffered packet");
                }
            }
        }
    }

    /// Typed [`poll_and_remove`](Self::poll_and_remove).
    pub fn take<T: PacketBody>(&self) -> Option<T> {
        self.poll_and_remove(T::KIND)
            .and_then(|packet| T::try_from(packet).ok())
    }

    /// Waits until a packet of `kind` is buffered, then removes and returns
    /// it.
    ///
    /// Cancel-safe: dropping the future never loses a packet, because the
    /// removal and the return happen in the same poll.
    pub async fn wait_and_remove(&self, kind: PacketKind) -> Packet {
        loop {
            // Register for the next arrival before looking, so a packet
            // delivered between the look and the await still wakes us.
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(packet) = self.poll_and_remove(kind) {
                return packet;
            }
            notified.await;
        }
    }

    /// Registers `callback` for every future packet of `kind`.
    ///
    /// Registering the same closure twice registers it twice. Packets
    /// delivered before registration are not replayed.
    pub fn add_observer<F>(&self, kind: PacketKind, callback: F) -> ObserverId
    where
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push(Registration {
            id,
            kind,
            callback: Arc::new(callback),
        });
        tracing::debug!(observer = %id, %kind, "observer registered");
        id
    }

    /// Typed [`add_observer`](Self::add_observer): the callback gets the
    /// body instead of the whole packet.
    pub fn observe<T, F>(&self, callback: F) -> ObserverId
    where
        T: PacketBody,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add_observer(T::KIND, move |packet| {
            if let Some(body) = T::peek(packet) {
                callback(body);
            }
        })
    }

    /// Unregisters an observer. Returns `false` if it was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        match observers.iter().position(|r| r.id == id) {
            Some(index) => {
                let removed = observers.remove(index);
                tracing::debug!(observer = %id, kind = %removed.kind, "observer removed");
                true
            }
            None => false,
        }
    }

    /// Unregisters every observer.
    pub fn clear_observers(&self) {
        self.observers.write().clear();
    }

    /// Number of observers registered for `kind`.
    pub fn observer_count(&self, kind: PacketKind) -> usize {
        self.observers
            .read()
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    /// Number of packets waiting in the buffer.
    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Drops every buffered packet.
    pub fn clear_buffer(&self) {
        self.buffer.lock().clear();
    }
}

impl fmt::Debug for InboundRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundRouter")
            .field("buffered", &self.buffered_len())
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use hottopics_protocol::{
        ChatroomUserCountUpdate, JoinChatroomResponse, ReceiveMessage,
        UsernameResponse,
    };

    use super::*;

    fn message(author: &str, text: &str) -> Packet {
        ReceiveMessage::new(author, text).into()
    }

    // =====================================================================
    // Buffer
    // =====================================================================

    #[test]
    fn test_poll_empty_buffer_returns_none() {
        let router = InboundRouter::new();
        assert!(router.poll_and_remove(PacketKind::UsernameResponse).is_none());
    }

    #[test]
    fn test_poll_removes_packet_exactly_once() {
        let router = InboundRouter::new();
        router.deliver(UsernameResponse { response: true }.into());

        assert!(router.poll_and_remove(PacketKind::UsernameResponse).is_some());
        assert!(router.poll_and_remove(PacketKind::UsernameResponse).is_none());
        assert_eq!(router.buffered_len(), 0);
    }

    #[test]
    fn test_poll_returns_oldest_of_kind_first() {
        let router = InboundRouter::new();
        router.deliver(message("amy", "first"));
        router.deliver(message("bob", "second"));

        let first = router.take::<ReceiveMessage>().unwrap();
        let second = router.take::<ReceiveMessage>().unwrap();
        assert_eq!(first.message, "first");
        assert_eq!(second.message, "second");
    }

    #[test]
    fn test_poll_skips_other_kinds() {
        let router = InboundRouter::new();
        router.deliver(ChatroomUserCountUpdate { size: 3 }.into());
        router.deliver(JoinChatroomResponse { response: true }.into());
        router.deliver(ChatroomUserCountUpdate { size: 4 }.into());

        let join = router.take::<JoinChatroomResponse>().unwrap();
        assert!(join.response);
        // The updates on either side are untouched and still in order.
        assert_eq!(router.buffered_len(), 2);
        assert_eq!(router.take::<ChatroomUserCountUpdate>().unwrap().size, 3);
        assert_eq!(router.take::<ChatroomUserCountUpdate>().unwrap().size, 4);
    }

    #[test]
    fn test_deliver_drops_invalid_packet() {
        let router = InboundRouter::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        router.add_observer(PacketKind::ReceiveMessage, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        router.deliver(message("", "no author"));

        assert_eq!(router.buffered_len(), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert!(router.poll_and_remove(PacketKind::ReceiveMessage).is_none());
    }

    #[tokio::test]
    async fn test_wait_finds_valid_packet_behind_invalid_one() {
        let router = InboundRouter::new();
        router.deliver(message("", "invalid"));
        router.deliver(message("bob", "valid"));

        let packet = tokio::time::timeout(
            Duration::from_millis(200),
            router.wait_and_remove(PacketKind::ReceiveMessage),
        )
        .await
        .unwrap();
        assert_eq!(packet, message("bob", "valid"));
    }

    #[test]
    fn test_poll_skips_invalid_buffered_packet() {
        let router = InboundRouter::new();
        // Invalid packets can't be delivered, so plant one directly.
        router.buffer.lock().push_back(message("", "invalid"));
        router.deliver(message("bob", "valid"));

        assert_eq!(router.take::<ReceiveMessage>().unwrap().message, "valid");
        assert_eq!(router.buffered_len(), 0);
    }

    #[test]
    fn test_clear_buffer() {
        let router = InboundRouter::new();
        router.deliver(message("amy", "hi"));
        router.clear_buffer();
        assert_eq!(router.buffered_len(), 0);
    }

    // =====================================================================
    // Observers
    // =====================================================================

    #[test]
    fn test_observer_sees_only_its_kind() {
        let router = InboundRouter::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        router.add_observer(PacketKind::ReceiveMessage, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        router.deliver(message("amy", "hi"));
        router.deliver(UsernameResponse { response: true }.into());

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_and_buffer_both_receive() {
        let router = InboundRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        router.observe::<ReceiveMessage, _>(move |msg| {
            sink.lock().push(msg.message.clone());
        });

        router.deliver(message("amy", "hello"));

        assert_eq!(*seen.lock(), vec!["hello".to_string()]);
        assert_eq!(router.take::<ReceiveMessage>().unwrap().message, "hello");
    }

    #[test]
    fn test_same_callback_registered_twice_runs_twice() {
        let router = InboundRouter::new();
        let seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let counter = Arc::clone(&seen);
            router.add_observer(PacketKind::ChatroomUserCountUpdate, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        router.deliver(ChatroomUserCountUpdate { size: 2 }.into());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_removed_observer_is_not_called() {
        let router = InboundRouter::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let id = router.add_observer(PacketKind::ReceiveMessage, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(router.remove_observer(id));
        assert!(!router.remove_observer(id));
        router.deliver(message("amy", "hi"));

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(router.observer_count(PacketKind::ReceiveMessage), 0);
    }

    #[test]
    fn test_observer_can_remove_itself_during_dispatch() {
        let router = Arc::new(InboundRouter::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<ObserverId>>> = Arc::new(Mutex::new(None));

        let weak = Arc::downgrade(&router);
        let counter = Arc::clone(&seen);
        let own_id = Arc::clone(&slot);
        let id = router.add_observer(PacketKind::ReceiveMessage, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let (Some(router), Some(id)) = (weak.upgrade(), *own_id.lock()) {
                router.remove_observer(id);
            }
        });
        *slot.lock() = Some(id);

        router.deliver(message("amy", "one"));
        router.deliver(message("amy", "two"));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_removing_one_of_two_observers_keeps_the_other() {
        let router = InboundRouter::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&first);
        let first_id = router.add_observer(PacketKind::ReceiveMessage, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&second);
        router.add_observer(PacketKind::ReceiveMessage, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        router.deliver(message("amy", "one"));
        assert!(router.remove_observer(first_id));
        router.deliver(message("amy", "two"));

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
        assert_eq!(router.observer_count(PacketKind::ReceiveMessage), 1);
    }

    #[test]
    fn test_removal_during_dispatch_does_not_skip_later_observer() {
        let router = Arc::new(InboundRouter::new());
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<ObserverId>>> = Arc::new(Mutex::new(None));

        let weak = Arc::downgrade(&router);
        let counter = Arc::clone(&first);
        let own_id = Arc::clone(&slot);
        let id = router.add_observer(PacketKind::ReceiveMessage, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let (Some(router), Some(id)) = (weak.upgrade(), *own_id.lock()) {
                router.remove_observer(id);
            }
        });
        *slot.lock() = Some(id);
        let counter = Arc::clone(&second);
        router.add_observer(PacketKind::ReceiveMessage, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        router.deliver(message("amy", "one"));
        router.deliver(message("amy", "two"));

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_observer_does_not_stop_others() {
        let router = InboundRouter::new();
        let seen = Arc::new(AtomicUsize::new(0));
        router.add_observer(PacketKind::ReceiveMessage, |_| {
            panic!("observer blew up");
        });
        let counter = Arc::clone(&seen);
        router.add_observer(PacketKind::ReceiveMessage, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        router.deliver(message("amy", "hi"));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(router.buffered_len(), 1);
    }

    #[test]
    fn test_clear_observers() {
        let router = InboundRouter::new();
        router.add_observer(PacketKind::ReceiveMessage, |_| {});
        router.add_observer(PacketKind::UsernameResponse, |_| {});
        router.clear_observers();
        assert_eq!(router.observer_count(PacketKind::ReceiveMessage), 0);
        assert_eq!(router.observer_count(PacketKind::UsernameResponse), 0);
    }

    // =====================================================================
    // Waiting
    // =====================================================================

    #[tokio::test]
    async fn test_wait_returns_already_buffered_packet() {
        let router = InboundRouter::new();
        router.deliver(UsernameResponse { response: false }.into());

        let packet = router.wait_and_remove(PacketKind::UsernameResponse).await;
        assert_eq!(packet, UsernameResponse { response: false }.into());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_later_arrival() {
        let router = Arc::new(InboundRouter::new());

        let waiter = {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                router.wait_and_remove(PacketKind::JoinChatroomResponse).await
            })
        };

        tokio::task::yield_now().await;
        router.deliver(message("amy", "not this one"));
        router.deliver(JoinChatroomResponse { response: true }.into());

        let packet = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(packet.kind(), PacketKind::JoinChatroomResponse);
        // The unrelated packet is still buffered.
        assert_eq!(router.buffered_len(), 1);
    }
}

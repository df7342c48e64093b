//! Node capabilities and the bookkeeping shared between them.
//!
//! A producer is anything that can be read; a consumer is anything that
//! records what it read. Derived nodes are both. Producers point at their
//! readers weakly so that an unreferenced reader can be reclaimed while its
//! inputs live on; consumers hold their inputs strongly, since a consumer
//! repopulates that set on every recomputation anyway.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::edges::{EdgeKey, EdgeMap};
use crate::error::SignalError;
use crate::version::{TrackingVersion, ValueVersion};

/// A producer's readers, dated by the tracking version each registered under.
pub(crate) type ConsumerEdges = EdgeMap<Weak<dyn Consumer>, TrackingVersion>;

/// A consumer's inputs, dated by the value version observed at registration.
pub(crate) type ProducerEdges = EdgeMap<Rc<dyn Producer>, ValueVersion>;

/// A readable node.
pub(crate) trait Producer {
    /// Bring the value up to date if it is possibly stale. A no-op for
    /// leaves, whose version is authoritative.
    fn refresh(&self) -> Result<(), SignalError>;

    /// Current value version.
    fn value_version(&self) -> ValueVersion;

    /// The readers registered against this node.
    fn consumers(&self) -> &RefCell<ConsumerEdges>;
}

/// A node that reads producers and can be told they may have changed.
pub(crate) trait Consumer {
    /// An upstream producer may have changed. `source` is the notifier, kept
    /// as a shortcut hint for the next staleness poll.
    fn notify(&self, source: Option<Rc<dyn Producer>>) -> Result<(), SignalError>;

    /// Current tracking version.
    fn tracking_version(&self) -> TrackingVersion;

    /// The inputs this node recorded during its last computation.
    fn sources(&self) -> &RefCell<ProducerEdges>;

    /// A weak handle producers can hold without extending this node's life.
    fn as_weak(&self) -> Weak<dyn Consumer>;
}

impl EdgeKey for Rc<dyn Producer> {
    fn addr(&self) -> usize {
        Rc::as_ptr(self).cast::<()>() as usize
    }
}

impl EdgeKey for Weak<dyn Consumer> {
    fn addr(&self) -> usize {
        // Valid for identity comparison even after the target is reclaimed.
        Weak::as_ptr(self).cast::<()>() as usize
    }
}

/// Address a producer is identified by in edge maps.
pub(crate) fn producer_addr(producer: &Rc<dyn Producer>) -> usize {
    Rc::as_ptr(producer).cast::<()>() as usize
}

thread_local! {
    /// The consumer currently running its computation. Reads register edges
    /// against it; it is `None` at every quiescent point.
    static ACTIVE_CONSUMER: RefCell<Option<Rc<dyn Consumer>>> = const { RefCell::new(None) };
}

/// The ambient active consumer, if a computation is running.
pub(crate) fn active_consumer() -> Option<Rc<dyn Consumer>> {
    ACTIVE_CONSUMER.with(|slot| slot.borrow().clone())
}

/// Makes a consumer ambient for the duration of its computation, restoring
/// the previous occupant on drop so the slot survives panics and early
/// returns.
pub(crate) struct ConsumerScope {
    previous: Option<Rc<dyn Consumer>>,
}

impl ConsumerScope {
    pub fn enter(consumer: Rc<dyn Consumer>) -> Self {
        let previous = ACTIVE_CONSUMER.with(|slot| slot.borrow_mut().replace(consumer));
        Self { previous }
    }
}

impl Drop for ConsumerScope {
    fn drop(&mut self) {
        ACTIVE_CONSUMER.with(|slot| *slot.borrow_mut() = self.previous.take());
    }
}

/// Records a read of `producer` against the ambient active consumer, if any.
///
/// Both directions are written through: the producer maps the consumer's weak
/// handle to the consumer's current tracking version (re-dating any edge left
/// from an earlier computation), and the consumer maps the producer to the
/// value version it observed.
pub(crate) fn track_read(producer: &Rc<dyn Producer>) {
    let Some(consumer) = active_consumer() else {
        return;
    };
    producer
        .consumers()
        .borrow_mut()
        .insert(consumer.as_weak(), consumer.tracking_version());
    consumer
        .sources()
        .borrow_mut()
        .insert(Rc::clone(producer), producer.value_version());
}

/// Notifies every live reader of `origin` that it may have changed.
///
/// Edges whose consumer was reclaimed, or whose recorded tracking version no
/// longer matches the consumer's current one, are dead: they are removed from
/// both sides and skipped. This walk is the engine's only opportunistic edge
/// collector.
pub(crate) fn fan_out(origin: &Rc<dyn Producer>) -> Result<(), SignalError> {
    let origin_addr = producer_addr(origin);
    let mut i = 0;
    loop {
        let entry = {
            let consumers = origin.consumers().borrow();
            if i >= consumers.slot_count() {
                break;
            }
            consumers.slot(i)
        };
        i += 1;
        let Some((weak, recorded)) = entry else {
            continue;
        };
        match weak.upgrade() {
            Some(consumer) if consumer.tracking_version() == recorded => {
                consumer.notify(Some(Rc::clone(origin)))?;
            }
            reclaimed_or_stale => {
                origin.consumers().borrow_mut().remove(weak.addr());
                if let Some(consumer) = reclaimed_or_stale {
                    consumer.sources().borrow_mut().remove(origin_addr);
                }
            }
        }
    }
    let mut consumers = origin.consumers().borrow_mut();
    if consumers.tombstones() > consumers.len() {
        consumers.defragment();
    }
    Ok(())
}

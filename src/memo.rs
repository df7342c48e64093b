//! Derived values: nodes that compute from whatever they read.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::mem;
use std::rc::{Rc, Weak};

use crate::edges::EdgeKey;
use crate::error::SignalError;
use crate::identity::Identity;
use crate::node::{
    fan_out, producer_addr, track_read, Consumer, ConsumerEdges, ConsumerScope, Producer,
    ProducerEdges,
};
use crate::version::{TrackingVersion, ValueVersion};

/// Cache slot of a derived node.
///
/// `Computing` is a dedicated tag, never a value that happens to look like
/// one: a computation re-entering itself observes it and fails as a cycle.
enum CachedValue<T> {
    /// Never computed, or reset after a failed computation.
    Unset,
    /// A computation for this node is on the stack right now.
    Computing,
    /// The cached result of the last successful computation.
    Stored(T),
}

/// Dirtiness of a derived node.
enum Staleness {
    /// The cached value is known good.
    Clean,
    /// Some input may have changed. The payload is the first producer that
    /// notified this epoch, kept as a polling shortcut; later notifiers are
    /// not recorded, which only costs the shortcut, not correctness.
    Dirty(Option<Rc<dyn Producer>>),
}

pub(crate) struct MemoState<T> {
    calculate: Box<dyn Fn() -> Result<T, SignalError>>,
    cached: RefCell<CachedValue<T>>,
    staleness: RefCell<Staleness>,
    version: Cell<ValueVersion>,
    tracking: Cell<TrackingVersion>,
    sources: RefCell<ProducerEdges>,
    consumers: RefCell<ConsumerEdges>,
    weak_self: Weak<MemoState<T>>,
}

impl<T: Identity + 'static> MemoState<T> {
    fn self_addr(&self) -> usize {
        self as *const Self as *const () as usize
    }

    /// Decides whether the last computed value could still be correct
    /// without recomputing. Returns true iff some recorded input actually
    /// changed since it was observed.
    ///
    /// The walk resolves inputs depth-first: asking an input to refresh may
    /// recurse into its own poll. Records whose back-edge no longer carries
    /// this node's current tracking version date from an earlier computation
    /// and are pruned from both sides rather than trusted.
    fn poll_sources(&self, hint: Option<Rc<dyn Producer>>) -> Result<bool, SignalError> {
        let my_addr = self.self_addr();
        let mut skip = None;

        if let Some(notifier) = hint {
            let notifier_addr = producer_addr(&notifier);
            let Some(seen) = self.sources.borrow().get(notifier_addr) else {
                // No record of the notifier; assume it changed.
                return Ok(true);
            };
            let edge = notifier.consumers().borrow().get(my_addr);
            if edge == Some(self.tracking.get()) {
                notifier.refresh()?;
                if notifier.value_version() != seen {
                    return Ok(true);
                }
                if self.sources.borrow().len() == 1 {
                    // The notifier was the only input, and it did not really
                    // change.
                    return Ok(false);
                }
                skip = Some(notifier_addr);
            }
        }

        let mut i = 0;
        loop {
            let entry = {
                let sources = self.sources.borrow();
                if i >= sources.slot_count() {
                    break;
                }
                sources.slot(i)
            };
            i += 1;
            let Some((source, seen)) = entry else {
                continue;
            };
            let source_addr = source.addr();
            if skip == Some(source_addr) {
                continue;
            }
            let edge = source.consumers().borrow().get(my_addr);
            if edge != Some(self.tracking.get()) {
                // Left over from an earlier computation; not a change.
                source.consumers().borrow_mut().remove(my_addr);
                self.sources.borrow_mut().remove(source_addr);
                continue;
            }
            source.refresh()?;
            if source.value_version() != seen {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn recompute(&self) -> Result<(), SignalError> {
        let prior = {
            let mut cached = self.cached.borrow_mut();
            if matches!(*cached, CachedValue::Computing) {
                return Err(SignalError::Cycle);
            }
            mem::replace(&mut *cached, CachedValue::Computing)
        };
        // One bump per recomputation, before the computation runs: every
        // edge recorded by earlier runs is now datable as stale.
        self.tracking.set(self.tracking.get().bump());
        // The run in progress will observe current inputs, so the node is no
        // longer pending a check; a notification landing before the run
        // completes is an input changing under it.
        *self.staleness.borrow_mut() = Staleness::Clean;

        let Some(this) = self.weak_self.upgrade() else {
            self.cached.replace(prior);
            return Ok(());
        };
        let result = {
            let _scope = ConsumerScope::enter(this as Rc<dyn Consumer>);
            (self.calculate)()
        };
        let value = match result {
            Ok(value) => value,
            Err(error) => {
                // Leave the node re-attemptable: the next read computes from
                // scratch instead of reporting a stuck cycle forever.
                self.cached.replace(CachedValue::Unset);
                *self.staleness.borrow_mut() = Staleness::Dirty(None);
                return Err(error);
            }
        };
        match prior {
            CachedValue::Stored(prior_value) if value.identical(&prior_value) => {
                // Same value as before: keep the original object so
                // downstream identity checks keep succeeding, and leave the
                // version alone.
                self.cached.replace(CachedValue::Stored(prior_value));
            }
            _ => {
                self.cached.replace(CachedValue::Stored(value));
                self.version.set(self.version.get().bump());
            }
        }
        Ok(())
    }

    fn stored_value(&self) -> Result<T, SignalError>
    where
        T: Clone,
    {
        match &*self.cached.borrow() {
            CachedValue::Stored(value) => Ok(value.clone()),
            // Only reachable when an earlier computation unwound without
            // finishing; the node is not in a usable state.
            _ => Err(SignalError::Cycle),
        }
    }
}

impl<T: Identity + 'static> Producer for MemoState<T> {
    fn refresh(&self) -> Result<(), SignalError> {
        let hint = match &*self.staleness.borrow() {
            Staleness::Clean => return Ok(()),
            Staleness::Dirty(hint) => hint.clone(),
        };
        let has_prior = matches!(&*self.cached.borrow(), CachedValue::Stored(_));
        if has_prior && !self.poll_sources(hint)? {
            // Every input is at the version we computed from; the cache
            // stands.
            *self.staleness.borrow_mut() = Staleness::Clean;
            return Ok(());
        }
        self.recompute()
    }

    fn value_version(&self) -> ValueVersion {
        self.version.get()
    }

    fn consumers(&self) -> &RefCell<ConsumerEdges> {
        &self.consumers
    }
}

impl<T: Identity + 'static> Consumer for MemoState<T> {
    fn notify(&self, source: Option<Rc<dyn Producer>>) -> Result<(), SignalError> {
        if matches!(&*self.staleness.borrow(), Staleness::Dirty(_)) {
            return Ok(());
        }
        if matches!(&*self.cached.borrow(), CachedValue::Computing) {
            return Err(SignalError::ChangedWhileEvaluating);
        }
        *self.staleness.borrow_mut() = Staleness::Dirty(source);
        let Some(this) = self.weak_self.upgrade() else {
            return Ok(());
        };
        fan_out(&(this as Rc<dyn Producer>))
    }

    fn tracking_version(&self) -> TrackingVersion {
        self.tracking.get()
    }

    fn sources(&self) -> &RefCell<ProducerEdges> {
        &self.sources
    }

    fn as_weak(&self) -> Weak<dyn Consumer> {
        self.weak_self.clone() as Weak<dyn Consumer>
    }
}

/// A derived node that recomputes its value from its inputs on demand.
///
/// The computation's dependency set is discovered implicitly: whatever
/// producers it reads while running become its inputs, re-discovered on
/// every run. Writes upstream only mark the memo possibly stale; the next
/// [`get`](Memo::get) polls the recorded inputs and recomputes only if one of
/// them actually changed in value.
///
/// Cloning the handle is cheap and shares the underlying node. Producers a
/// memo reads hold it only weakly, so dropping every handle reclaims the
/// node even while its inputs live on.
///
/// # Example
///
/// ```
/// # use ripple::{Memo, Signal};
/// # fn main() -> Result<(), ripple::SignalError> {
/// let base = Signal::new(2_u32);
/// let b = base.clone();
/// let doubled = Memo::new(move || Ok(b.get() * 2));
///
/// assert_eq!(doubled.get()?, 4);
/// base.set(10)?;
/// assert_eq!(doubled.get()?, 20);
/// # Ok(())
/// # }
/// ```
pub struct Memo<T> {
    state: Rc<MemoState<T>>,
}

impl<T: Identity + 'static> Memo<T> {
    /// Create a derived node from a computation.
    ///
    /// The computation must be deterministic in its inputs' current values
    /// and must not write to any producer it reads. It does not run until
    /// the first read.
    pub fn new(calculate: impl Fn() -> Result<T, SignalError> + 'static) -> Self {
        Self {
            state: Rc::new_cyclic(|weak| MemoState {
                calculate: Box::new(calculate),
                cached: RefCell::new(CachedValue::Unset),
                staleness: RefCell::new(Staleness::Dirty(None)),
                version: Cell::new(ValueVersion::INITIAL),
                tracking: Cell::new(TrackingVersion::default()),
                sources: RefCell::new(ProducerEdges::default()),
                consumers: RefCell::new(ConsumerEdges::default()),
                weak_self: weak.clone(),
            }),
        }
    }

    /// Read the current value, resolving staleness first and registering a
    /// dependency edge if an enclosing computation is running.
    ///
    /// # Errors
    ///
    /// [`SignalError::Cycle`] if the computation, directly or transitively,
    /// reads this node.
    pub fn get(&self) -> Result<T, SignalError>
    where
        T: Clone,
    {
        self.state.refresh()?;
        let value = self.state.stored_value()?;
        // Register only successful reads; a self-read must not leave a
        // self-edge (and with it a strong reference cycle) behind.
        track_read(&(self.state.clone() as Rc<dyn Producer>));
        Ok(value)
    }

    /// Read the current value without registering a dependency.
    pub fn get_untracked(&self) -> Result<T, SignalError>
    where
        T: Clone,
    {
        self.state.refresh()?;
        self.state.stored_value()
    }

    /// The version of the cached value.
    pub fn value_version(&self) -> ValueVersion {
        self.state.version.get()
    }

    /// The tracking generation of the last computation.
    pub fn tracking_version(&self) -> TrackingVersion {
        self.state.tracking.get()
    }

    /// Whether an input may have changed since the last computation.
    pub fn is_stale(&self) -> bool {
        matches!(&*self.state.staleness.borrow(), Staleness::Dirty(_))
    }

    /// Whether the node holds a computed value.
    pub fn has_value(&self) -> bool {
        matches!(&*self.state.cached.borrow(), CachedValue::Stored(_))
    }

    /// Number of input edges currently recorded, including records from
    /// earlier computations that have not been pruned yet.
    pub fn dependency_count(&self) -> usize {
        self.state.sources.borrow().len()
    }

    /// Number of reader edges currently registered, including edges whose
    /// reader has been reclaimed but not yet swept.
    pub fn consumer_count(&self) -> usize {
        self.state.consumers.borrow().len()
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field(
                "stale",
                &matches!(&*self.state.staleness.borrow(), Staleness::Dirty(_)),
            )
            .field(
                "has_value",
                &matches!(&*self.state.cached.borrow(), CachedValue::Stored(_)),
            )
            .field("dependencies", &self.state.sources.borrow().len())
            .field("consumers", &self.state.consumers.borrow().len())
            .finish()
    }
}

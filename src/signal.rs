//! Leaf values: the directly-settable inputs of a graph.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::Rc;

use crate::error::SignalError;
use crate::identity::Identity;
use crate::node::{fan_out, track_read, ConsumerEdges, Producer};
use crate::version::ValueVersion;

pub(crate) struct SignalState<T> {
    value: RefCell<T>,
    version: Cell<ValueVersion>,
    consumers: RefCell<ConsumerEdges>,
}

impl<T: 'static> Producer for SignalState<T> {
    fn refresh(&self) -> Result<(), SignalError> {
        // A leaf's version is authoritative; there is nothing to resolve.
        Ok(())
    }

    fn value_version(&self) -> ValueVersion {
        self.version.get()
    }

    fn consumers(&self) -> &RefCell<ConsumerEdges> {
        &self.consumers
    }
}

/// A leaf node holding a directly-settable value.
///
/// Cloning the handle is cheap and shares the underlying node. Reading a
/// signal inside a [`Memo`](crate::Memo) computation registers a dependency
/// edge; writing it marks dependent memos as possibly stale without
/// recomputing anything.
///
/// # Example
///
/// ```
/// # use ripple::Signal;
/// let count = Signal::new(0);
/// assert_eq!(count.get(), 0);
/// count.set(5).unwrap();
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T> {
    state: Rc<SignalState<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            state: Rc::new(SignalState {
                value: RefCell::new(initial),
                version: Cell::new(ValueVersion::INITIAL),
                consumers: RefCell::new(ConsumerEdges::default()),
            }),
        }
    }

    /// Read the current value, registering a dependency edge if a
    /// computation is running.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        track_read(&(self.state.clone() as Rc<dyn Producer>));
        self.state.value.borrow().clone()
    }

    /// Read the current value without registering a dependency.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.state.value.borrow().clone()
    }

    /// Replace the value and notify readers.
    ///
    /// A write that is [identical](Identity) to the current value is a
    /// complete no-op: no version bump, no notification.
    ///
    /// # Errors
    ///
    /// Fails with [`SignalError::ChangedWhileEvaluating`] if this signal is
    /// an input of a computation that is currently running, which means the
    /// computation wrote to its own input.
    pub fn set(&self, value: T) -> Result<(), SignalError>
    where
        T: Identity,
    {
        if value.identical(&self.state.value.borrow()) {
            return Ok(());
        }
        *self.state.value.borrow_mut() = value;
        self.state.version.set(self.state.version.get().bump());
        fan_out(&(self.state.clone() as Rc<dyn Producer>))
    }

    /// Replace the value with `f` applied to the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<(), SignalError>
    where
        T: Identity,
    {
        let next = f(&self.state.value.borrow());
        self.set(next)
    }

    /// Mutate the held value in place, then unconditionally bump the version
    /// and notify readers.
    ///
    /// This is the escape hatch for changing the interior of a composite
    /// value without constructing a new one; the caller vouches that the
    /// change is semantic.
    pub fn mutate(&self, f: impl FnOnce(&mut T)) -> Result<(), SignalError> {
        f(&mut self.state.value.borrow_mut());
        self.state.version.set(self.state.version.get().bump());
        fan_out(&(self.state.clone() as Rc<dyn Producer>))
    }

    /// The version of the current value.
    pub fn value_version(&self) -> ValueVersion {
        self.state.version.get()
    }

    /// Number of reader edges currently registered, including edges whose
    /// reader has been reclaimed but not yet swept.
    pub fn consumer_count(&self) -> usize {
        self.state.consumers.borrow().len()
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("value", &*self.state.value.borrow())
            .field("version", &self.state.version.get())
            .field("consumers", &self.consumer_count())
            .finish()
    }
}

//! Notification channel for machine events.
//!
//! Listeners are plain callbacks run synchronously by `emit`. The stack
//! wait returned by `push_and_wait` is built on top of a one-shot
//! listener.

use crate::machine::error::MachineError;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Something observable that happened inside a machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineEvent {
    /// A transition completed
    Transitioned { from: Option<String>, to: String },

    /// A push transition completed, leaving the stack `depth` deep
    StackPushed { depth: usize },

    /// A pop transition completed, leaving the stack `depth` deep
    StackPopped { depth: usize },
}

/// Identifies a listener registered with `on`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Returns `true` once the listener wants to be removed.
type Listener = Box<dyn FnMut(&MachineEvent) -> bool>;

pub(crate) struct EventBus {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    // Listeners taken out of `listeners` while an emit runs them.
    in_flight: RefCell<Vec<ListenerId>>,
    removed_in_flight: RefCell<Vec<ListenerId>>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
            in_flight: RefCell::new(Vec::new()),
            removed_in_flight: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe<F>(&self, mut listener: F) -> ListenerId
    where
        F: FnMut(&MachineEvent) + 'static,
    {
        self.subscribe_until(move |event| {
            listener(event);
            false
        })
    }

    pub(crate) fn subscribe_until<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(&MachineEvent) -> bool + 'static,
    {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, Box::new(listener)));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        if listeners.len() < before {
            return true;
        }
        drop(listeners);
        if self.in_flight.borrow().contains(&id) {
            self.removed_in_flight.borrow_mut().push(id);
            return true;
        }
        false
    }

    pub(crate) fn emit(&self, event: &MachineEvent) {
        let mut active = std::mem::take(&mut *self.listeners.borrow_mut());
        if active.is_empty() {
            return;
        }
        self.in_flight
            .borrow_mut()
            .extend(active.iter().map(|(id, _)| *id));

        active.retain_mut(|(_, listener)| !listener(event));

        let removed = std::mem::take(&mut *self.removed_in_flight.borrow_mut());
        self.in_flight.borrow_mut().clear();
        active.retain(|(id, _)| !removed.contains(id));

        // Keep registration order: survivors first, then anything added
        // while listeners ran.
        let mut listeners = self.listeners.borrow_mut();
        let added = std::mem::take(&mut *listeners);
        *listeners = active;
        listeners.extend(added);
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.borrow().len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WaitStatus {
    Pending,
    Resolved,
    Abandoned,
}

/// Resolves when the stack unwinds back to the depth it had before a
/// `push_and_wait`.
///
/// Intermediate pops from deeper nested pushes do not resolve it. If the
/// machine is dropped first, the wait fails with
/// [`MachineError::WaitAbandoned`]. Dropping an unresolved wait removes its
/// listener from the machine.
#[derive(Debug)]
pub struct StackWait {
    depth: usize,
    receiver: oneshot::Receiver<()>,
    status: WaitStatus,
    listener: Option<(Weak<EventBus>, ListenerId)>,
}

impl StackWait {
    pub(crate) fn new(depth: usize, receiver: oneshot::Receiver<()>) -> Self {
        Self {
            depth,
            receiver,
            status: WaitStatus::Pending,
            listener: None,
        }
    }

    /// Tie the wait to the listener that resolves it.
    pub(crate) fn watching(mut self, bus: &Rc<EventBus>, id: ListenerId) -> Self {
        self.listener = Some((Rc::downgrade(bus), id));
        self
    }

    /// Stack depth this wait resolves at.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Check without awaiting whether the wait has resolved or been
    /// abandoned.
    pub fn is_settled(&mut self) -> bool {
        if self.status == WaitStatus::Pending {
            match self.receiver.try_recv() {
                Ok(()) => self.status = WaitStatus::Resolved,
                Err(oneshot::error::TryRecvError::Closed) => self.status = WaitStatus::Abandoned,
                Err(oneshot::error::TryRecvError::Empty) => {}
            }
        }
        self.status != WaitStatus::Pending
    }

    fn outcome(&self) -> Result<(), MachineError> {
        match self.status {
            WaitStatus::Abandoned => Err(MachineError::WaitAbandoned { depth: self.depth }),
            _ => Ok(()),
        }
    }
}

impl Drop for StackWait {
    fn drop(&mut self) {
        if let Some((bus, id)) = self.listener.take() {
            if let Some(bus) = bus.upgrade() {
                // Already gone once the listener fired.
                bus.unsubscribe(id);
            }
        }
    }
}

impl Future for StackWait {
    type Output = Result<(), MachineError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.status != WaitStatus::Pending {
            return Poll::Ready(self.outcome());
        }
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(())) => self.status = WaitStatus::Resolved,
            Poll::Ready(Err(_)) => self.status = WaitStatus::Abandoned,
            Poll::Pending => return Poll::Pending,
        }
        Poll::Ready(self.outcome())
    }
}

//! Settle-once values with registered continuations.
//!
//! A `Deferred<T>` is pending until someone calls `settle`, then holds the
//! value forever. Continuations registered while pending run synchronously,
//! in registration order, inside the `settle` call; continuations registered
//! after settling run immediately. There is no executor: whoever settles the
//! value drives the continuation chain, which keeps interleavings explicit
//! and deterministic.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Continuation<T> = Box<dyn FnOnce(T)>;

enum State<T> {
    Pending(Vec<Continuation<T>>),
    Settled(T),
}

pub struct Deferred<T> {
    state: Rc<RefCell<State<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: Clone + 'static> Deferred<T> {
    pub fn pending() -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Pending(Vec::new()))),
        }
    }

    pub fn settled(value: T) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Settled(value))),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*self.state.borrow(), State::Pending(_))
    }

    /// Current value, if settled.
    pub fn peek(&self) -> Option<T> {
        match &*self.state.borrow() {
            State::Settled(value) => Some(value.clone()),
            State::Pending(_) => None,
        }
    }

    /// Settle with `value` and run every waiting continuation.
    ///
    /// Returns false (and drops `value`) if already settled.
    pub fn settle(&self, value: T) -> bool {
        let waiters = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Settled(_) => return false,
                State::Pending(waiters) => {
                    let waiters = std::mem::take(waiters);
                    *state = State::Settled(value.clone());
                    waiters
                }
            }
        };
        for waiter in waiters {
            waiter(value.clone());
        }
        true
    }

    /// Run `f` once the value is settled (immediately if it already is).
    pub fn on_settle(&self, f: impl FnOnce(T) + 'static) {
        let settled = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Pending(waiters) => {
                    waiters.push(Box::new(f));
                    return;
                }
                State::Settled(value) => value.clone(),
            }
        };
        f(settled);
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.borrow() {
            State::Pending(waiters) => write!(f, "Deferred::Pending({} waiters)", waiters.len()),
            State::Settled(value) => write!(f, "Deferred::Settled({value:?})"),
        }
    }
}

//! Single-threaded cooperative dispatcher and timer queue.
//!
//! One interface, two implementations: a virtual-clock loop driven by the
//! [`crate::replay::ReplayScheduler`] in backtest, and (conceptually) an
//! OS-timer-backed loop in live trading. Only the backtest implementation is
//! in scope for this crate; strategies never see the distinction.

use std::{
    cell::{Cell, RefCell},
    cmp::Reverse,
    collections::BinaryHeap,
    rc::Rc,
};

use crate::types::Time;

/// Signature for timer callbacks. The return value is the delay to use for
/// the next invocation; `0` means "do not reschedule".
pub type TimerFn = Box<dyn FnMut(Time) -> Time>;

/// Shared contract between the backtest and live event loops.
pub trait EventLoop {
    /// Enqueues a closure to run in FIFO order at the next opportunity.
    fn dispatch(&self, f: Box<dyn FnOnce()>);

    /// Enqueues a timer closure invoked at `now + delay`. Its return value is
    /// interpreted as the next delay; `0` stops the timer.
    fn dispatch_after(&self, delay: Time, f: TimerFn);

    /// Used by invariants to assert single-writer discipline.
    fn this_thread_is_ev(&self) -> bool;
}

struct TimerEntry {
    deadline: Time,
    seq: u64,
    callback: TimerFn,
}

/// Orders by deadline, then by insertion sequence, so that timers with equal
/// deadlines fire in FIFO order (a `BinaryHeap` is a max-heap, so we invert
/// both fields via `Reverse`).
impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

/// Virtual-clock-driven event loop used in backtesting. "Now" is whatever the
/// [`crate::replay::ReplayScheduler`] has most recently advanced its virtual
/// clock to; there are no idle waits.
#[derive(Clone)]
pub struct BacktestEventLoop {
    clock: Rc<Cell<Time>>,
    immediate: Rc<RefCell<std::collections::VecDeque<Box<dyn FnOnce()>>>>,
    timers: Rc<RefCell<BinaryHeap<Reverse<TimerEntry>>>>,
    next_seq: Rc<Cell<u64>>,
}

impl BacktestEventLoop {
    pub fn new(clock: Rc<Cell<Time>>) -> Self {
        Self {
            clock,
            immediate: Rc::new(RefCell::new(std::collections::VecDeque::new())),
            timers: Rc::new(RefCell::new(BinaryHeap::new())),
            next_seq: Rc::new(Cell::new(0)),
        }
    }

    /// Drains the immediate-dispatch queue in FIFO order. Called by the
    /// scheduler at the top of each iteration, between events.
    pub fn drain_immediate(&self) {
        loop {
            let next = self.immediate.borrow_mut().pop_front();
            match next {
                Some(f) => f(),
                None => break,
            }
        }
    }

    /// Fires every timer whose deadline is `<= now`, in FIFO order per
    /// deadline, rescheduling any that return a nonzero delay.
    pub fn fire_due(&self, now: Time) {
        loop {
            let due = {
                let timers = self.timers.borrow();
                matches!(timers.peek(), Some(Reverse(t)) if t.deadline <= now)
            };
            if !due {
                break;
            }
            let Reverse(mut entry) = self.timers.borrow_mut().pop().unwrap();
            let next_delay = (entry.callback)(now);
            if next_delay > 0 {
                self.timers.borrow_mut().push(Reverse(TimerEntry {
                    deadline: now + next_delay,
                    seq: self.alloc_seq(),
                    callback: entry.callback,
                }));
            }
        }
    }

    fn alloc_seq(&self) -> u64 {
        let s = self.next_seq.get();
        self.next_seq.set(s + 1);
        s
    }

    pub fn has_pending_timers(&self) -> bool {
        !self.timers.borrow().is_empty()
    }
}

impl EventLoop for BacktestEventLoop {
    fn dispatch(&self, f: Box<dyn FnOnce()>) {
        self.immediate.borrow_mut().push_back(f);
    }

    fn dispatch_after(&self, delay: Time, f: TimerFn) {
        let now = self.clock.get();
        let seq = self.alloc_seq();
        self.timers.borrow_mut().push(Reverse(TimerEntry {
            deadline: now + delay,
            seq,
            callback: f,
        }));
    }

    fn this_thread_is_ev(&self) -> bool {
        // The backtest core is single-threaded by construction; there is no
        // other thread that could call into it.
        true
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn timers_fire_in_fifo_order_for_equal_deadlines() {
        let clock = Rc::new(Cell::new(0));
        let ev = BacktestEventLoop::new(clock);
        let order = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            ev.dispatch_after(
                100,
                Box::new(move |_now| {
                    order.borrow_mut().push(i);
                    0
                }),
            );
        }
        ev.fire_due(100);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn nonzero_return_reschedules() {
        let clock = Rc::new(Cell::new(0));
        let ev = BacktestEventLoop::new(clock);
        let count = Rc::new(Cell::new(0));
        let count2 = count.clone();
        ev.dispatch_after(
            10,
            Box::new(move |_now| {
                count2.set(count2.get() + 1);
                if count2.get() < 3 {
                    10
                } else {
                    0
                }
            }),
        );
        ev.fire_due(10);
        ev.fire_due(20);
        ev.fire_due(30);
        assert_eq!(count.get(), 3);
        assert!(!ev.has_pending_timers());
    }
}

use crate::world::events::{PositionEvent, RenderingEvent, SelectEvent};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// Callback handle. Two handles are the same listener when they point to the same closure.
pub type Listener<E> = Rc<dyn Fn(&E) -> anyhow::Result<()>>;

pub type RenderingListener = Listener<RenderingEvent>;
pub type RenderingExceptionListener = Listener<anyhow::Error>;
pub type PositionListener = Listener<PositionEvent>;
pub type SelectListener = Listener<SelectEvent>;

/// Wraps a closure into a listener handle.
pub fn listener<E, F>(f: F) -> Listener<E>
where
    F: Fn(&E) -> anyhow::Result<()> + 'static,
{
    Rc::new(f)
}

fn same<E>(a: &Listener<E>, b: &Listener<E>) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

/// Ordered set of listeners. Insertion order is invocation order.
pub struct ListenerSet<E> {
    kind: &'static str,
    listeners: Vec<Listener<E>>,
}

impl<E> ListenerSet<E> {
    pub fn new(kind: &'static str) -> Self {
        Self { kind, listeners: Vec::new() }
    }

    /// Adds `listener`. Returns false when it was already registered.
    pub fn add(&mut self, listener: Listener<E>) -> bool {
        if self.contains(&listener) {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    /// Removes `listener`. Returns false when it was not registered.
    pub fn remove(&mut self, listener: &Listener<E>) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| !same(l, listener));
        before != self.listeners.len()
    }

    pub fn contains(&self, listener: &Listener<E>) -> bool {
        self.listeners.iter().any(|l| same(l, listener))
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Calls every listener with `event`. A failing listener is logged and the remaining
    /// ones still run. Returns the number of listeners that failed.
    pub fn dispatch(&self, event: &E) -> usize {
        let mut failed = 0;
        for (idx, l) in self.listeners.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| l(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    log::error!("{} listener #{idx} failed: {e:#}", self.kind);
                }
                Err(_) => {
                    failed += 1;
                    log::error!("{} listener #{idx} panicked", self.kind);
                }
            }
        }
        failed
    }
}

/// All listener sets of a window.
pub struct ListenerRegistries {
    pub rendering: ListenerSet<RenderingEvent>,
    pub rendering_exception: ListenerSet<anyhow::Error>,
    pub position: ListenerSet<PositionEvent>,
    pub select: ListenerSet<SelectEvent>,
}

impl Default for ListenerRegistries {
    fn default() -> Self {
        Self {
            rendering: ListenerSet::new("rendering"),
            rendering_exception: ListenerSet::new("rendering-exception"),
            position: ListenerSet::new("position"),
            select: ListenerSet::new("select"),
        }
    }
}

impl ListenerRegistries {
    /// Detaches every listener.
    pub fn clear(&mut self) {
        self.rendering.clear();
        self.rendering_exception.clear();
        self.position.clear();
        self.select.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn duplicates_are_ignored_and_order_is_kept() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut set: ListenerSet<u32> = ListenerSet::new("test");

        let c = calls.clone();
        let first = listener(move |e: &u32| {
            c.borrow_mut().push(("first", *e));
            Ok(())
        });
        let c = calls.clone();
        let second = listener(move |e: &u32| {
            c.borrow_mut().push(("second", *e));
            Ok(())
        });

        assert!(set.add(first.clone()));
        assert!(set.add(second.clone()));
        assert!(!set.add(first.clone()));
        assert_eq!(set.len(), 2);

        set.dispatch(&7);
        assert_eq!(*calls.borrow(), vec![("first", 7), ("second", 7)]);

        assert!(set.remove(&first));
        assert!(!set.remove(&first));
        assert!(set.contains(&second));
    }

    #[test]
    fn failing_listeners_do_not_stop_dispatch() {
        let reached = Rc::new(RefCell::new(false));
        let mut set: ListenerSet<u32> = ListenerSet::new("test");

        set.add(listener(|_: &u32| Err(anyhow::anyhow!("nope"))));
        set.add(listener(|_: &u32| -> anyhow::Result<()> { panic!("listener blew up") }));
        let r = reached.clone();
        set.add(listener(move |_: &u32| {
            *r.borrow_mut() = true;
            Ok(())
        }));

        assert_eq!(set.dispatch(&1), 2);
        assert!(*reached.borrow());
    }

    #[test]
    fn registries_clear_everything() {
        let mut regs = ListenerRegistries::default();
        regs.position.add(listener(|_: &PositionEvent| Ok(())));
        regs.rendering_exception.add(listener(|_: &anyhow::Error| Ok(())));
        regs.clear();
        assert!(regs.position.is_empty());
        assert!(regs.rendering_exception.is_empty());
    }
}

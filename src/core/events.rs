//! Closure-based observer lists.

use std::fmt;

/// Listeners for one kind of event, called in subscription order.
pub struct Observers<T> {
    listeners: Vec<Box<dyn FnMut(&T)>>,
}

impl<T> Observers<T> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&T) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn notify(&mut self, event: &T) {
        for listener in self.listeners.iter_mut() {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_notify_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut observers = Observers::new();

        let first = log.clone();
        observers.subscribe(move |v: &u32| first.borrow_mut().push(("a", *v)));
        let second = log.clone();
        observers.subscribe(move |v: &u32| second.borrow_mut().push(("b", *v)));

        observers.notify(&7);
        assert_eq!(observers.len(), 2);
        assert_eq!(*log.borrow(), vec![("a", 7), ("b", 7)]);
    }
}

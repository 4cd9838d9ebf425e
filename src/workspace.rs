//! Per-thread kernel scratch storage.
use std::any::Any;
use std::cell::RefCell;

/// Type-erased scratch buffers, at most one per type.
///
/// Entries are kept in most-recently-used order at the back, since a kernel sweep asks for the
/// same scratch type once per element.
#[derive(Debug, Default)]
pub(crate) struct ScratchStore {
    entries: Vec<Box<dyn Any>>,
}

impl ScratchStore {
    pub(crate) fn entry<W: Any + Default>(&mut self) -> &mut W {
        let is_last = self.entries.last().is_some_and(|entry| entry.is::<W>());
        if !is_last {
            match self.entries.iter().rposition(|entry| entry.is::<W>()) {
                Some(pos) => {
                    let entry = self.entries.remove(pos);
                    self.entries.push(entry);
                }
                None => self.entries.push(Box::new(W::default())),
            }
        }

        match self.entries.last_mut().and_then(|entry| entry.downcast_mut::<W>()) {
            Some(scratch) => scratch,
            None => unreachable!("the last scratch entry always has the requested type"),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

thread_local! {
    static SCRATCH: RefCell<ScratchStore> = RefCell::new(ScratchStore::default());
}

/// Runs `f` with the calling thread's scratch entry of type `W`.
///
/// # Panics
///
/// Panics if called re-entrantly from within `f`.
pub(crate) fn with_thread_local_workspace<W, R>(f: impl FnOnce(&mut W) -> R) -> R
where
    W: Any + Default,
{
    SCRATCH.with(|store| f(store.borrow_mut().entry()))
}

/// A simple slab of reusable slots.
///
/// A `Slab` stores values in a contiguous vector and hands out small
/// indices that are recycled after removal. Execution contexts use it to
/// track the tasks bound to them, so the whole set can be torn down when
/// the context closes.
pub(crate) struct Slab<T> {
    /// Storage for items; `None` marks a free slot.
    items: Vec<Option<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with `size` pre-allocated free slots.
    pub(crate) fn new(size: usize) -> Self {
        let items = (0..size).map(|_| None).collect();
        let free = (0..size).rev().collect();

        Self {
            items,
            free,
            len: 0,
        }
    }

    /// Inserts a value and returns its index.
    ///
    /// A free slot is reused when available; otherwise the slab grows
    /// exponentially.
    pub(crate) fn insert(&mut self, item: T) -> usize {
        let index = if let Some(i) = self.free.pop() {
            i
        } else {
            let len = self.items.len();
            let new_len = if len == 0 { 1 } else { 2 * len };

            self.items.extend((len..new_len).map(|_| None));
            self.free.extend(((len + 1)..new_len).rev());

            len
        };

        self.items[index] = Some(item);
        self.len += 1;

        index
    }

    /// Removes and returns the value stored at `index`.
    ///
    /// Returns `None` when the slot is out of range or already free, which
    /// happens when a task deregisters after the slab was drained.
    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        let item = self.items.get_mut(index)?.take()?;

        self.free.push(index);
        self.len -= 1;

        Some(item)
    }

    /// Returns the number of occupied slots.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Removes every value, leaving all slots free.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let drained: Vec<T> = self.items.iter_mut().filter_map(Option::take).collect();

        self.free = (0..self.items.len()).rev().collect();
        self.len = 0;

        drained
    }
}

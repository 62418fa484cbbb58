//! Fixed-capacity circular byte queue.
//!
//! Both directions of the control loop buffer bytes in a [`ByteQueue`]: step
//! commands arriving from the host and status bytes waiting to go back. The
//! backing store is an inline array, so a queue is allocated once with its
//! owner and never resized.

/// Circular FIFO of bytes with a capacity fixed at compile time.
///
/// A power-of-two `N` keeps the index wraparound cheap, but any non-zero
/// capacity is valid. A zero capacity is rejected at compile time.
///
/// # Example
///
/// ```rust,ignore
/// let mut queue = ByteQueue::<4>::new();
/// queue.insert(0x5A)?;
/// assert_eq!(queue.peek(), Some(0x5A));
/// assert_eq!(queue.remove(), Some(0x5A));
/// ```
#[derive(Debug, Clone)]
pub struct ByteQueue<const N: usize> {
    data: [u8; N],
    /// Next slot to read
    head: usize,
    /// Next slot to write
    tail: usize,
    /// Live elements, `0..=N`
    count: usize,
}

impl<const N: usize> ByteQueue<N> {
    const NON_EMPTY: () = assert!(N > 0, "ByteQueue capacity must be non-zero");

    /// Create an empty queue.
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_EMPTY;

        Self {
            data: [0u8; N],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Append a byte at the back of the queue.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The byte was stored
    /// * `Err(byte)` - The queue is full; the byte is handed back and the queue is untouched
    pub fn insert(&mut self, byte: u8) -> Result<(), u8> {
        if self.is_full() {
            return Err(byte);
        }

        self.data[self.tail] = byte;
        self.tail = Self::advance(self.tail);
        self.count += 1;
        Ok(())
    }

    /// Take the byte at the front of the queue, or `None` when empty.
    pub fn remove(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }

        let byte = self.data[self.head];
        self.head = Self::advance(self.head);
        self.count -= 1;
        Some(byte)
    }

    /// Look at the byte at the front of the queue without removing it.
    ///
    /// Lets a caller try to hand the byte on and only [`remove`](Self::remove)
    /// it once the hand-off succeeded.
    pub fn peek(&self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.data[self.head])
        }
    }

    /// Number of bytes currently queued.
    pub const fn len(&self) -> usize {
        self.count
    }

    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub const fn is_full(&self) -> bool {
        self.count == N
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Free slots left before the queue is full.
    pub const fn free(&self) -> usize {
        N - self.count
    }

    /// Drop every queued byte.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    #[inline]
    const fn advance(index: usize) -> usize {
        if index + 1 == N {
            0
        } else {
            index + 1
        }
    }
}

impl<const N: usize> Default for ByteQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

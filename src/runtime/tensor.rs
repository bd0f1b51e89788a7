//! Pooled tensor buffers with balanced-acquisition accounting.
//!
//! Every buffer handed to the inference call comes from a [`TensorArena`],
//! acquired through a per-call [`ArenaScope`], and returns to the pool when
//! the owning [`Tensor`] guard drops, on success, error, and unwind alike.
//! The scope counts this call's acquisitions and releases; an imbalance
//! after the call means something held a buffer past its scope, which the
//! adapter treats as an unrecoverable defect rather than a warning, since a
//! leak here grows without bound over a session's lifetime.

use std::cell::Cell;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Upper bound on buffers kept for reuse; beyond this, dropped buffers free.
const POOL_LIMIT: usize = 32;

/// Process-wide pooled allocator for inference buffers.
pub struct TensorArena {
    pool: Mutex<Vec<Vec<f32>>>,
    /// Tensors currently alive across all scopes; a single counter so
    /// readers never observe an acquire without its matching release.
    in_flight: AtomicI64,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl TensorArena {
    pub fn new() -> Self {
        Self {
            pool: Mutex::new(Vec::new()),
            in_flight: AtomicI64::new(0),
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    /// Opens an accounting scope for one inference call. All acquisition
    /// goes through a scope; the caller checks balance when the call ends.
    pub fn scope(&self) -> ArenaScope<'_> {
        ArenaScope {
            arena: self,
            acquired: Cell::new(0),
            released: Cell::new(0),
        }
    }

    /// Tensors currently alive (acquired but not yet released), across the
    /// whole process.
    pub fn live(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst).max(0) as u64
    }

    /// Total acquisitions over the arena's lifetime.
    pub fn total_acquired(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Total releases over the arena's lifetime.
    pub fn total_released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    fn take_buffer(&self, len: usize) -> Vec<f32> {
        let mut buf = self
            .pool
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        buf.clear();
        buf.resize(len, 0.0);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        buf
    }

    fn return_buffer(&self, mut buf: Vec<f32>) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
        let mut pool = self
            .pool
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if pool.len() < POOL_LIMIT {
            buf.clear();
            pool.push(buf);
        }
    }
}

impl Default for TensorArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Accounting region for one inference call.
///
/// Single-threaded by construction (interior `Cell` counters): a scope lives
/// on the calling thread for exactly one call.
pub struct ArenaScope<'a> {
    arena: &'a TensorArena,
    acquired: Cell<u64>,
    released: Cell<u64>,
}

impl<'a> ArenaScope<'a> {
    /// Acquires a zeroed tensor of the given shape, charged to this scope.
    pub fn acquire<'s>(&'s self, shape: &[usize]) -> Tensor<'s> {
        let len: usize = shape.iter().product();
        let buf = self.arena.take_buffer(len);
        self.acquired.set(self.acquired.get() + 1);
        Tensor {
            scope: self,
            buf,
            shape: shape.to_vec(),
        }
    }

    /// True when every tensor acquired in this scope has been released.
    pub fn is_balanced(&self) -> bool {
        self.acquired.get() == self.released.get()
    }

    /// Tensors acquired in this scope.
    pub fn acquired(&self) -> u64 {
        self.acquired.get()
    }

    /// Tensors released back from this scope.
    pub fn released(&self) -> u64 {
        self.released.get()
    }

    fn note_release(&self, buf: Vec<f32>) {
        self.released.set(self.released.get() + 1);
        self.arena.return_buffer(buf);
    }
}

/// Owning guard for one arena buffer.
///
/// The inference call never receives this type, only the borrowed
/// [`TensorView`] / [`TensorViewMut`], so it cannot extend a buffer's
/// lifetime past the adapter's scope.
pub struct Tensor<'s> {
    scope: &'s ArenaScope<'s>,
    buf: Vec<f32>,
    shape: Vec<usize>,
}

impl Tensor<'_> {
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            data: &self.buf,
            shape: &self.shape,
        }
    }

    pub fn view_mut(&mut self) -> TensorViewMut<'_> {
        TensorViewMut {
            data: &mut self.buf,
            shape: &self.shape,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.buf
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.buf
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
}

impl Drop for Tensor<'_> {
    fn drop(&mut self) {
        self.scope.note_release(std::mem::take(&mut self.buf));
    }
}

/// Borrowed read-only view of a tensor.
#[derive(Clone, Copy)]
pub struct TensorView<'t> {
    pub data: &'t [f32],
    pub shape: &'t [usize],
}

/// Borrowed mutable view of a tensor.
pub struct TensorViewMut<'t> {
    pub data: &'t mut [f32],
    pub shape: &'t [usize],
}

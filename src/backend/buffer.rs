//! Device memory: accounted allocations and typed device arrays

use crate::ast::ElementKind;
use crate::error::LaunchError;
use crate::host::HostArray;
use crate::signature::{Layout, TypeSignature};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct PoolState {
    in_use: usize,
    live: usize,
}

/// Allocation accounting for one device
#[derive(Debug)]
pub(crate) struct MemoryPool {
    capacity: usize,
    state: Mutex<PoolState>,
    next_id: AtomicU64,
}

impl MemoryPool {
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            state: Mutex::new(PoolState::default()),
            next_id: AtomicU64::new(1),
        })
    }

    fn reserve(&self, bytes: usize) -> Result<u64, LaunchError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.in_use + bytes > self.capacity {
            return Err(LaunchError::Allocation {
                requested: bytes,
                in_use: state.in_use,
                capacity: self.capacity,
            });
        }
        state.in_use += bytes;
        state.live += 1;
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn release(&self, bytes: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_use = state.in_use.saturating_sub(bytes);
        state.live = state.live.saturating_sub(1);
    }

    pub(crate) fn in_use(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).in_use
    }

    pub(crate) fn live(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).live
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

struct Allocation {
    id: u64,
    size: usize,
    pool: Arc<MemoryPool>,
    data: RwLock<Vec<u8>>,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.pool.release(self.size);
    }
}

/// Raw device memory. Clones share the allocation, which is returned to the
/// pool when the last clone is dropped.
#[derive(Clone)]
pub struct DeviceBuffer {
    inner: Arc<Allocation>,
}

impl DeviceBuffer {
    pub(crate) fn allocate(pool: &Arc<MemoryPool>, bytes: usize) -> Result<Self, LaunchError> {
        let id = pool.reserve(bytes)?;
        Ok(Self {
            inner: Arc::new(Allocation {
                id,
                size: bytes,
                pool: Arc::clone(pool),
                data: RwLock::new(vec![0u8; bytes]),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn byte_len(&self) -> usize {
        self.inner.size
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.inner.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.inner.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write_from_host(&self, data: &[u8]) -> Result<(), LaunchError> {
        let mut dst = self.write();
        if dst.len() != data.len() {
            return Err(LaunchError::HostTransfer(format!(
                "buffer holds {} bytes, host data has {}",
                dst.len(),
                data.len()
            )));
        }
        dst.copy_from_slice(data);
        Ok(())
    }

    pub fn read_to_host(&self) -> Vec<u8> {
        self.read().clone()
    }

    pub fn same_allocation(&self, other: &DeviceBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceBuffer(#{}, {} bytes)", self.id(), self.byte_len())
    }
}

/// A typed array resident in device memory
#[derive(Debug, Clone)]
pub struct DeviceArray {
    buffer: DeviceBuffer,
    kind: ElementKind,
    shape: Vec<usize>,
    layout: Layout,
}

impl DeviceArray {
    pub(crate) fn new(
        buffer: DeviceBuffer,
        kind: ElementKind,
        shape: Vec<usize>,
        layout: Layout,
    ) -> Self {
        let layout = if shape.len() <= 1 {
            Layout::RowMajor
        } else {
            layout
        };
        Self {
            buffer,
            kind,
            shape,
            layout,
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn signature(&self) -> TypeSignature {
        TypeSignature::array(self.kind, self.shape.len(), self.layout)
    }

    pub fn buffer(&self) -> &DeviceBuffer {
        &self.buffer
    }

    /// Copy the contents back to a new host array
    pub fn copy_to_host(&self) -> Result<HostArray, LaunchError> {
        HostArray::from_bytes(self.kind, &self.shape, self.layout, self.buffer.read_to_host())
            .map_err(|e| LaunchError::HostTransfer(e.to_string()))
    }

    /// Overwrite the contents from a host array of the same kind, shape and layout
    pub fn copy_from_host(&self, host: &HostArray) -> Result<(), LaunchError> {
        if host.signature() != self.signature() || host.shape() != self.shape() {
            return Err(LaunchError::HostTransfer(format!(
                "cannot copy {} {:?} into {} {:?}",
                host.signature(),
                host.shape(),
                self.signature(),
                self.shape
            )));
        }
        self.buffer.write_from_host(host.bytes())
    }
}

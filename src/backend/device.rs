//! Emulated compute device
//!
//! Provides the allocation, copy and launch contract of a GPU without a
//! vendor driver: device memory is an accounted pool of host allocations
//! and kernels run on stream worker threads.

use super::buffer::{DeviceArray, DeviceBuffer, MemoryPool};
use super::stream::Stream;
use crate::ast::ElementKind;
use crate::error::LaunchError;
use crate::host::HostArray;
use crate::signature::Layout;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hardware characteristics of a device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub name: String,
    /// Number of streaming multiprocessors
    pub multiprocessor_count: u32,
    pub max_threads_per_block: u32,
    pub max_grid_dims: [u32; 3],
    pub warp_size: u32,
    /// Device memory in bytes
    pub memory_capacity: usize,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            name: "kernjit emulated device".to_string(),
            multiprocessor_count: 16,
            max_threads_per_block: 1024,
            max_grid_dims: [2_147_483_647, 65_535, 65_535],
            warp_size: 32,
            memory_capacity: 1 << 30, // 1GB
        }
    }
}

impl DeviceProfile {
    pub fn with_memory_capacity(mut self, bytes: usize) -> Self {
        self.memory_capacity = bytes;
        self
    }

    pub fn with_multiprocessor_count(mut self, count: u32) -> Self {
        self.multiprocessor_count = count;
        self
    }
}

/// A device with its own memory pool and streams
pub struct EmulatedDevice {
    profile: DeviceProfile,
    pool: std::sync::Arc<MemoryPool>,
    default_stream: Stream,
    next_stream_id: AtomicU64,
}

impl EmulatedDevice {
    pub fn new(profile: DeviceProfile) -> Result<Self, LaunchError> {
        let pool = MemoryPool::new(profile.memory_capacity);
        let default_stream = Stream::spawn(0)?;
        log::debug!(
            "device '{}' ready ({} SMs, {} bytes)",
            profile.name,
            profile.multiprocessor_count,
            profile.memory_capacity
        );
        Ok(Self {
            profile,
            pool,
            default_stream,
            next_stream_id: AtomicU64::new(1),
        })
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Allocate raw device memory
    pub fn allocate(&self, bytes: usize) -> Result<DeviceBuffer, LaunchError> {
        DeviceBuffer::allocate(&self.pool, bytes)
    }

    /// Allocate a zero-filled device array
    pub fn device_array(
        &self,
        kind: ElementKind,
        shape: &[usize],
        layout: Layout,
    ) -> Result<DeviceArray, LaunchError> {
        let len: usize = shape.iter().product();
        let buffer = self.allocate(len * kind.size_in_bytes())?;
        Ok(DeviceArray::new(buffer, kind, shape.to_vec(), layout))
    }

    /// Copy a host array into a new device array
    pub fn to_device(&self, host: &HostArray) -> Result<DeviceArray, LaunchError> {
        let array = self.device_array(host.kind(), host.shape(), host.layout())?;
        array.buffer().write_from_host(host.bytes())?;
        Ok(array)
    }

    pub fn memory_in_use(&self) -> usize {
        self.pool.in_use()
    }

    pub fn live_allocations(&self) -> usize {
        self.pool.live()
    }

    pub fn memory_capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn default_stream(&self) -> &Stream {
        &self.default_stream
    }

    pub fn create_stream(&self) -> Result<Stream, LaunchError> {
        Stream::spawn(self.next_stream_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Wait for all work on the default stream
    pub fn synchronize(&self) -> Result<(), LaunchError> {
        self.default_stream.synchronize()
    }
}

impl std::fmt::Debug for EmulatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulatedDevice")
            .field("name", &self.profile.name)
            .field("memory_in_use", &self.memory_in_use())
            .finish()
    }
}

use std::ptr::NonNull;
use std::sync::Arc;

use aligned_vec::{AVec, RuntimeAlign};
use strata_types::Coord;

use crate::InstanceLayout;

/// Instance memory that can only be reached by copying, such as memory on another node or on an
/// accelerator without a host mapping.
pub trait RemoteMemory: Send + Sync {
    /// Fill `out` with the bytes starting at `offset`.
    fn read(&self, offset: usize, out: &mut [u8]);

    fn write(&self, offset: usize, data: &[u8]);
}

enum InstanceMemory {
    Local {
        // Owns the allocation `base` points into. Never touched after construction.
        _buffer: AVec<u8, RuntimeAlign>,
        base: NonNull<u8>,
    },
    Remote(Arc<dyn RemoteMemory>),
}

/// Storage for every field of a layout.
///
/// Accessors write through raw addresses derived from a shared borrow, so an instance can move
/// between threads but cannot be shared by them.
pub struct RegionInstance<const N: usize, T = i32> {
    layout: Arc<InstanceLayout<N, T>>,
    memory: InstanceMemory,
}

// SAFETY: the only non-Send member is the pointer into the owned buffer, which moves with it.
// `NonNull` keeps the instance !Sync.
unsafe impl<const N: usize, T: Coord> Send for RegionInstance<N, T> {}

impl<const N: usize, T: Coord> RegionInstance<N, T> {
    /// Zeroed host memory of `bytes_used` bytes aligned to the layout's requirement.
    pub fn new_local(layout: Arc<InstanceLayout<N, T>>) -> Self {
        let size = layout.bytes_used();
        let alignment = layout.alignment_reqd().max(1).next_power_of_two();
        let mut buffer = AVec::<u8, RuntimeAlign>::with_capacity(alignment, size);
        buffer.resize(size, 0u8);
        let base = NonNull::new(buffer.as_mut_ptr()).unwrap_or(NonNull::dangling());
        tracing::debug!(size, alignment, "allocated local instance");
        Self {
            layout,
            memory: InstanceMemory::Local {
                _buffer: buffer,
                base,
            },
        }
    }

    pub fn new_remote(layout: Arc<InstanceLayout<N, T>>, memory: Arc<dyn RemoteMemory>) -> Self {
        Self {
            layout,
            memory: InstanceMemory::Remote(memory),
        }
    }

    pub fn layout(&self) -> &Arc<InstanceLayout<N, T>> {
        &self.layout
    }

    pub fn size(&self) -> usize {
        self.layout.bytes_used()
    }

    /// The memory can be addressed directly.
    pub fn is_local(&self) -> bool {
        matches!(self.memory, InstanceMemory::Local { .. })
    }

    /// Start of local memory. Layout offsets are relative to this address.
    pub(crate) fn base_address(&self) -> Option<NonNull<u8>> {
        match &self.memory {
            InstanceMemory::Local { base, .. } => Some(*base),
            InstanceMemory::Remote(_) => None,
        }
    }

    fn check_range(&self, offset: usize, len: usize) {
        let in_range = offset
            .checked_add(len)
            .is_some_and(|end| end <= self.size());
        assert!(
            in_range,
            "{len} bytes at offset {offset} are outside the {} byte instance",
            self.size()
        );
    }

    /// Copy `out.len()` bytes starting at `offset` out of the instance.
    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        match &self.memory {
            InstanceMemory::Local { base, .. } => {
                self.check_range(offset, out.len());
                // SAFETY: the range is inside the allocation and `out` cannot alias it, since no
                // reference into instance memory is ever handed out.
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        base.as_ptr().add(offset),
                        out.as_mut_ptr(),
                        out.len(),
                    )
                }
            }
            InstanceMemory::Remote(remote) => remote.read(offset, out),
        }
    }

    pub fn write_bytes(&self, offset: usize, data: &[u8]) {
        match &self.memory {
            InstanceMemory::Local { base, .. } => {
                self.check_range(offset, data.len());
                // SAFETY: same as `read_bytes`. The instance is !Sync, so no other thread writes.
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        data.as_ptr(),
                        base.as_ptr().add(offset),
                        data.len(),
                    )
                }
            }
            InstanceMemory::Remote(remote) => remote.write(offset, data),
        }
    }
}

impl<const N: usize, T: Coord> std::fmt::Debug for RegionInstance<N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionInstance")
            .field("local", &self.is_local())
            .field("layout", &self.layout)
            .finish()
    }
}

use std::sync::atomic::{Ordering, fence};

use aligned_vec::AVec;

use super::instruction::INSTRUCTION_ALIGNMENT;
use crate::error::AllocError;

/// Memory a lookup program is compiled into.
///
/// The compiler calls [`ProgramMemory::allocate_memory`] exactly once with the final program
/// size, writes the program, then calls [`ProgramMemory::commit_updates`]. The program must be
/// visible to every evaluator once `commit_updates` returns.
pub trait ProgramMemory {
    /// A writable, zeroed, 16 byte aligned buffer of exactly `bytes` bytes.
    fn allocate_memory(&mut self, bytes: usize) -> Result<&mut [u8], AllocError>;

    fn commit_updates(&mut self);

    /// The committed program, or `None` before [`ProgramMemory::commit_updates`].
    fn committed_bytes(&self) -> Option<&[u8]>;
}

/// Program memory on the host heap.
#[derive(Debug, Default)]
pub struct HostProgramMemory {
    buffer: Option<AVec<u8>>,
    limit: Option<usize>,
    committed: bool,
}

impl HostProgramMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse programs larger than `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

impl ProgramMemory for HostProgramMemory {
    fn allocate_memory(&mut self, bytes: usize) -> Result<&mut [u8], AllocError> {
        if self.buffer.is_some() {
            return Err(AllocError::AlreadyAllocated);
        }
        if let Some(limit) = self.limit {
            if bytes > limit {
                return Err(AllocError::Exhausted {
                    requested: bytes,
                    available: limit,
                });
            }
        }
        let mut buffer = AVec::with_capacity(INSTRUCTION_ALIGNMENT, bytes);
        buffer.resize(bytes, 0);
        Ok(self.buffer.insert(buffer).as_mut_slice())
    }

    fn commit_updates(&mut self) {
        fence(Ordering::Release);
        self.committed = true;
    }

    fn committed_bytes(&self) -> Option<&[u8]> {
        if !self.committed {
            return None;
        }
        self.buffer.as_ref().map(|buffer| buffer.as_slice())
    }
}

#[test]
fn test_host_memory_allocates_once() {
    let mut memory = HostProgramMemory::with_limit(64);
    assert_eq!(
        memory.allocate_memory(128).unwrap_err(),
        AllocError::Exhausted {
            requested: 128,
            available: 64
        }
    );
    let bytes = memory.allocate_memory(48).unwrap();
    assert_eq!(bytes.len(), 48);
    assert_eq!(bytes.as_ptr() as usize % INSTRUCTION_ALIGNMENT, 0);
    bytes[0] = 7;
    assert!(memory.committed_bytes().is_none());
    assert_eq!(memory.allocate_memory(16).unwrap_err(), AllocError::AlreadyAllocated);
    memory.commit_updates();
    assert_eq!(memory.committed_bytes().unwrap()[0], 7);
}

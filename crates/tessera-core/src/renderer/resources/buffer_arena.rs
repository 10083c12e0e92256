// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sub-allocation of vertex data inside a few large buffers.

use super::{bind_context, upgrade_context, EpochHandle};
use crate::renderer::api::{BufferTarget, BufferUsage, ContextId, NativeHandle};
use crate::renderer::context::{ContextListener, ListenerId, RenderingContext};
use crate::renderer::error::{ContextError, DriverError, ResourceError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// A block handed out by [`VertexBufferArena::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaAllocation {
    buffer: usize,
    offset: usize,
    size: usize,
}

impl ArenaAllocation {
    /// Index of the arena buffer holding the block.
    pub fn buffer_index(&self) -> usize {
        self.buffer
    }

    /// Aligned byte offset of the block in its buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Requested size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FreeBlock {
    offset: usize,
    size: usize,
}

#[derive(Debug)]
struct ArenaBuffer {
    handle: Option<EpochHandle>,
    size: usize,
    /// Sorted by offset, never adjacent.
    free: Vec<FreeBlock>,
    /// Alignment padding in front of live allocations, keyed by their offset.
    padding: HashMap<usize, usize>,
}

impl ArenaBuffer {
    fn new(size: usize) -> Self {
        Self {
            handle: None,
            size,
            free: vec![FreeBlock { offset: 0, size }],
            padding: HashMap::new(),
        }
    }

    fn insert_free(&mut self, offset: usize, size: usize) {
        let at = self.free.partition_point(|b| b.offset < offset);
        self.free.insert(at, FreeBlock { offset, size });

        if at + 1 < self.free.len() && self.free[at].offset + self.free[at].size == self.free[at + 1].offset {
            self.free[at].size += self.free[at + 1].size;
            self.free.remove(at + 1);
        }
        if at > 0 && self.free[at - 1].offset + self.free[at - 1].size == self.free[at].offset {
            self.free[at - 1].size += self.free[at].size;
            self.free.remove(at);
        }
    }
}

fn align_up(offset: usize, alignment: usize) -> usize {
    offset.div_ceil(alignment) * alignment
}

#[derive(Debug, Clone, Copy)]
struct Fit {
    buffer: usize,
    block: usize,
    padding: usize,
    leftover: usize,
}

/// Per-context allocator of vertex data blocks.
///
/// Owns buffers of `block_size` bytes (or larger, for oversized requests)
/// and serves allocations from their free lists with a best-fit search.
/// Freed blocks merge with their free neighbours. After a context
/// recreation the buffers are recreated with the same sizes and the
/// bookkeeping is kept, so owners only need to re-upload their data.
pub struct VertexBufferArena {
    context: Weak<RenderingContext>,
    context_id: ContextId,
    block_size: usize,
    buffers: Mutex<Vec<ArenaBuffer>>,
    listener: Mutex<Option<ListenerId>>,
}

impl std::fmt::Debug for VertexBufferArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexBufferArena")
            .field("context", &self.context_id)
            .field("block_size", &self.block_size)
            .field("buffers", &self.buffers.lock().len())
            .finish()
    }
}

impl VertexBufferArena {
    /// Creates an empty arena for `context`. No buffer is allocated until the
    /// first request.
    pub fn new(context: &Arc<RenderingContext>, block_size: usize) -> Result<Arc<Self>, ResourceError> {
        if !context.is_valid() {
            return Err(ResourceError::Context(ContextError::InvalidContext));
        }
        let arena = Arc::new(Self {
            context: Arc::downgrade(context),
            context_id: context.id(),
            block_size: block_size.max(1),
            buffers: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
        });
        let weak: Weak<dyn ContextListener> = Arc::downgrade(&arena) as Weak<dyn ContextListener>;
        *arena.listener.lock() = Some(context.subscribe(weak));
        Ok(arena)
    }

    /// Id of the owning context.
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    /// Default size of each arena buffer.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of buffers allocated so far.
    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Number of free blocks across all buffers.
    pub fn free_block_count(&self) -> usize {
        self.buffers.lock().iter().map(|b| b.free.len()).sum()
    }

    /// Total free bytes across all buffers.
    pub fn free_bytes(&self) -> usize {
        self.buffers
            .lock()
            .iter()
            .flat_map(|b| b.free.iter())
            .map(|f| f.size)
            .sum()
    }

    /// The native buffer holding `allocation`, in the current context epoch.
    pub fn buffer(&self, allocation: &ArenaAllocation) -> Option<NativeHandle> {
        let context = self.context.upgrade()?;
        self.buffers
            .lock()
            .get(allocation.buffer)
            .and_then(|b| b.handle)
            .and_then(|h| h.get(&context))
    }

    /// Reserves `size` bytes aligned to `alignment`.
    pub fn allocate(&self, size: usize, alignment: usize) -> Result<ArenaAllocation, ResourceError> {
        if alignment == 0 {
            return Err(ResourceError::BackendError(
                "vertex block alignment must be non-zero".to_string(),
            ));
        }
        if size == 0 {
            return Err(ResourceError::OutOfBounds);
        }

        // Lock order: render lock, then free lists.
        let context = upgrade_context(&self.context)?;
        let _lock = context.lock_render();
        let mut buffers = self.buffers.lock();
        let fit = match Self::best_fit(&buffers, size, alignment) {
            Some(fit) => fit,
            None => {
                let capacity = self.block_size.max(size);
                let mut buffer = ArenaBuffer::new(capacity);
                buffer.handle = Some(Self::create_native(&context, capacity)?);
                buffers.push(buffer);
                log::debug!(
                    "VertexBufferArena in {}: added buffer #{} ({capacity} bytes).",
                    self.context_id,
                    buffers.len() - 1
                );
                Fit {
                    buffer: buffers.len() - 1,
                    block: 0,
                    padding: 0,
                    leftover: capacity - size,
                }
            }
        };

        let buffer = &mut buffers[fit.buffer];
        let block = &mut buffer.free[fit.block];
        let offset = block.offset + fit.padding;
        block.offset = offset + size;
        block.size = fit.leftover;
        if block.size == 0 {
            buffer.free.remove(fit.block);
        }
        if fit.padding > 0 {
            buffer.padding.insert(offset, fit.padding);
        }
        Ok(ArenaAllocation {
            buffer: fit.buffer,
            offset,
            size,
        })
    }

    fn best_fit(buffers: &[ArenaBuffer], size: usize, alignment: usize) -> Option<Fit> {
        let mut best: Option<Fit> = None;
        for (buffer_index, buffer) in buffers.iter().enumerate() {
            for (block_index, block) in buffer.free.iter().enumerate() {
                let padding = align_up(block.offset, alignment) - block.offset;
                let Some(leftover) = block.size.checked_sub(size + padding) else {
                    continue;
                };
                let fit = Fit {
                    buffer: buffer_index,
                    block: block_index,
                    padding,
                    leftover,
                };
                if leftover == 0 && padding == 0 {
                    return Some(fit);
                }
                if best.map_or(true, |b| leftover < b.leftover) {
                    best = Some(fit);
                }
            }
        }
        best
    }

    /// Returns `allocation` to the free list, merging it with adjacent free
    /// blocks.
    pub fn free(&self, allocation: ArenaAllocation) -> Result<(), ResourceError> {
        let mut buffers = self.buffers.lock();
        let buffer = buffers
            .get_mut(allocation.buffer)
            .ok_or(ResourceError::OutOfBounds)?;
        if allocation.offset + allocation.size > buffer.size {
            return Err(ResourceError::OutOfBounds);
        }
        let padding = buffer.padding.remove(&allocation.offset).unwrap_or(0);
        let offset = allocation.offset - padding;
        let size = allocation.size + padding;
        debug_assert!(
            !buffer
                .free
                .iter()
                .any(|b| offset < b.offset + b.size && b.offset < offset + size),
            "double free of {allocation:?}"
        );
        buffer.insert_free(offset, size);
        Ok(())
    }

    /// Uploads `data` to the start of `allocation`.
    pub fn write(&self, allocation: &ArenaAllocation, data: &[u8]) -> Result<(), ResourceError> {
        if data.len() > allocation.size {
            return Err(ResourceError::OutOfBounds);
        }
        let context = upgrade_context(&self.context)?;
        let handle = self.buffer(allocation).ok_or(ResourceError::InvalidHandle)?;
        let bound = bind_context(&context)?;
        bound.context.state().bind_buffer(BufferTarget::Array, Some(handle));
        bound
            .context
            .driver()
            .buffer_sub_data(BufferTarget::Array, allocation.offset, data);
        Ok(())
    }

    fn create_native(context: &RenderingContext, size: usize) -> Result<EpochHandle, ResourceError> {
        let bound = bind_context(context)?;
        let driver = bound.context.driver();
        let handle = driver
            .create_buffer()
            .ok_or(DriverError::ObjectCreationFailed("vertex arena buffer"))?;
        bound.context.state().bind_buffer(BufferTarget::Array, Some(handle));
        driver.buffer_data(BufferTarget::Array, size, None, BufferUsage::DynamicDraw);
        Ok(EpochHandle::new(handle, context))
    }
}

impl ContextListener for VertexBufferArena {
    fn on_context_setup_complete(&self, context: &RenderingContext) {
        let mut buffers = self.buffers.lock();
        for buffer in buffers.iter_mut() {
            if buffer.handle.and_then(|h| h.get(context)).is_some() {
                continue;
            }
            match Self::create_native(context, buffer.size) {
                Ok(handle) => buffer.handle = Some(handle),
                Err(e) => log::error!("VertexBufferArena in {}: {e}", self.context_id),
            }
        }
    }

    fn on_context_destroyed(&self, context: &RenderingContext) {
        let mut buffers = self.buffers.lock();
        if context.is_destroyed() {
            buffers.clear();
        } else {
            buffers.iter_mut().for_each(|b| b.handle = None);
        }
    }
}

impl Drop for VertexBufferArena {
    fn drop(&mut self) {
        let Some(context) = self.context.upgrade() else {
            return;
        };
        if let Some(id) = self.listener.get_mut().take() {
            context.unsubscribe(id);
        }
        let handles: Vec<NativeHandle> = self
            .buffers
            .get_mut()
            .iter()
            .filter_map(|b| b.handle.and_then(|h| h.get(&context)))
            .collect();
        if handles.is_empty() {
            return;
        }
        if let Ok(bound) = bind_context(&context) {
            let mut state = bound.context.state();
            for handle in handles {
                state.forget_buffer(handle);
                bound.context.driver().delete_buffer(handle);
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::context::ContextConfig;
    use crate::renderer::headless::HeadlessDriver;
    use crate::renderer::RenderSystem;

    fn arena(block_size: usize) -> (Arc<HeadlessDriver>, RenderSystem, Arc<RenderingContext>, Arc<VertexBufferArena>) {
        let driver = Arc::new(HeadlessDriver::new());
        let system = RenderSystem::new(driver.clone(), Default::default());
        let context = system.create_context(None, ContextConfig::labeled("c1")).unwrap();
        let arena = VertexBufferArena::new(&context, block_size).unwrap();
        (driver, system, context, arena)
    }

    #[test]
    fn test_alignment_padding_is_returned_on_free() {
        let (_driver, _system, _context, arena) = arena(1024);
        let a = arena.allocate(10, 1).unwrap();
        let b = arena.allocate(16, 16).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 16);
        assert_eq!(arena.free_bytes(), 1024 - 32);

        arena.free(b).unwrap();
        assert_eq!(arena.free_bytes(), 1024 - 10);
        assert_eq!(arena.free_block_count(), 1);
    }

    #[test]
    fn test_best_fit_prefers_smallest_hole() {
        let (_driver, _system, _context, arena) = arena(1024);
        let blocks: Vec<_> = [64, 16, 128, 16, 32, 16]
            .iter()
            .map(|&size| arena.allocate(size, 1).unwrap())
            .collect();
        // Holes of 64 and 32 bytes, plus the tail.
        arena.free(blocks[0]).unwrap();
        arena.free(blocks[4]).unwrap();
        let c = arena.allocate(24, 1).unwrap();
        assert_eq!(c.offset(), blocks[4].offset());
    }

    #[test]
    fn test_oversized_request_gets_its_own_buffer() {
        let (_driver, _system, _context, arena) = arena(256);
        arena.allocate(200, 4).unwrap();
        let big = arena.allocate(1000, 4).unwrap();
        assert_eq!(big.buffer_index(), 1);
        assert_eq!(arena.buffer_count(), 2);
    }

    #[test]
    fn test_zero_alignment_is_rejected() {
        let (_driver, _system, _context, arena) = arena(256);
        assert!(arena.allocate(16, 0).is_err());
    }

    #[test]
    fn test_write_lands_at_offset() {
        let (driver, _system, context, arena) = arena(64);
        let _skip = arena.allocate(8, 1).unwrap();
        let block = arena.allocate(4, 4).unwrap();
        arena.write(&block, &[1, 2, 3, 4]).unwrap();
        assert_eq!(arena.write(&block, &[0; 5]), Err(ResourceError::OutOfBounds));

        let _bind = context.scoped_bind(false).unwrap();
        let contents = driver.buffer_contents(arena.buffer(&block).unwrap()).unwrap();
        assert_eq!(&contents[8..12], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_buffers_survive_recreation() {
        let (_driver, _system, context, arena) = arena(64);
        let block = arena.allocate(16, 1).unwrap();
        context.recreate().unwrap();
        assert!(arena.buffer(&block).is_some());
        assert_eq!(arena.free_bytes(), 48);
    }
}

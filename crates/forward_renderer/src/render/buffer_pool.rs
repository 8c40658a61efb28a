//! Fixed-capacity pool of uniform buffer slots
//!
//! A [`BufferPool`] owns one device-local uniform buffer split into
//! `capacity` equally sized slots. Every slot is paired at construction
//! with a descriptor set bound to exactly that slot's range, so binding a
//! [`SubBuffer`] is a single descriptor set bind.
//!
//! # Dirty tracking
//!
//! Objects whose data lives in the pool (cameras, lights) are keyed by
//! identity. [`BufferPool::acquire`] hands back the object's current slot,
//! or allocates a fresh one when the object is new or dirty. A stale slot is
//! never freed directly: it is moved to the caller's retire list, which the
//! forward technique keeps per frame and only returns to the pool once that
//! frame's fence has signaled.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::foundation::logging::RenderLogger;
use crate::render::api::{
    BufferDesc, BufferHandle, BufferUsage, DescriptorSetHandle, DescriptorSetLayoutHandle,
    DeviceError, GraphicsDevice, MemoryHandle, MemoryLocation,
};
use crate::render::RenderResult;

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// One slot of a [`BufferPool`]
///
/// A `SubBuffer` is a move-only usage right: while the caller holds it no
/// other allocation can hand out the same slot.
#[derive(Debug, PartialEq, Eq)]
pub struct SubBuffer {
    pool: u32,
    index: u32,
    buffer: BufferHandle,
    offset: u64,
    size: u64,
    descriptor_set: DescriptorSetHandle,
}

impl SubBuffer {
    /// Id of the pool the slot belongs to
    pub const fn pool_id(&self) -> u32 {
        self.pool
    }

    /// Slot index within the pool
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// The pool's backing buffer
    pub const fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    /// Byte offset of the slot in the backing buffer
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes visible through the descriptor set
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Descriptor set bound to this slot
    pub const fn descriptor_set(&self) -> DescriptorSetHandle {
        self.descriptor_set
    }
}

/// Fixed-capacity allocator of uniform buffer slots keyed by object identity
#[derive(Debug)]
pub struct BufferPool<K> {
    id: u32,
    name: &'static str,
    buffer: BufferHandle,
    memory: MemoryHandle,
    element_size: u64,
    slot_size: u64,
    descriptor_sets: Vec<DescriptorSetHandle>,
    free: Vec<u32>,
    allocated: Vec<bool>,
    cache: HashMap<K, SubBuffer>,
    logger: RenderLogger,
}

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

impl<K: Copy + Eq + Hash> BufferPool<K> {
    /// Allocate the backing buffer and one descriptor set per slot
    ///
    /// `element_size` is rounded up to the device's uniform offset alignment
    /// to get the slot size. Everything created before a failure is released
    /// again before the error is returned.
    pub fn new<D: GraphicsDevice + ?Sized>(
        device: &D,
        logger: RenderLogger,
        name: &'static str,
        capacity: u32,
        element_size: u64,
        queue_families: &[u32],
        layout: DescriptorSetLayoutHandle,
    ) -> RenderResult<Self> {
        let slot_size = align_up(element_size, device.uniform_buffer_alignment());
        let mut pool = Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            name,
            buffer: BufferHandle::NULL,
            memory: MemoryHandle::NULL,
            element_size,
            slot_size,
            descriptor_sets: Vec::with_capacity(capacity as usize),
            free: (0..capacity).rev().collect(),
            allocated: vec![false; capacity as usize],
            cache: HashMap::new(),
            logger,
        };

        if let Err(e) = pool.create_resources(device, capacity, queue_families, layout) {
            pool.logger.error(format_args!(
                "Failed to create buffer pool '{name}': {e} (native code {:?})",
                e.native_code()
            ));
            pool.destroy(device);
            return Err(e.into());
        }

        pool.logger.info(format_args!(
            "Created buffer pool '{name}': {capacity} slots of {slot_size} bytes"
        ));
        Ok(pool)
    }

    fn create_resources<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &D,
        capacity: u32,
        queue_families: &[u32],
        layout: DescriptorSetLayoutHandle,
    ) -> Result<(), DeviceError> {
        self.buffer = device.create_buffer(&BufferDesc {
            size: self.slot_size * u64::from(capacity),
            usage: BufferUsage::UNIFORM | BufferUsage::TRANSFER_DST,
            queue_families,
        })?;
        self.memory = device.allocate_buffer_memory(self.buffer, MemoryLocation::DeviceLocal)?;

        for index in 0..u64::from(capacity) {
            let set = device.create_uniform_descriptor_set(
                layout,
                self.buffer,
                index * self.slot_size,
                self.element_size,
            )?;
            self.descriptor_sets.push(set);
        }
        Ok(())
    }

    /// Pool name used in logs and errors
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Unique pool id, matched against [`SubBuffer::pool_id`]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.allocated.len()
    }

    /// Slots currently on the free list
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Stride between slots in bytes
    pub const fn slot_size(&self) -> u64 {
        self.slot_size
    }

    /// Backing buffer
    pub const fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    /// Pop a slot off the free list; `None` once the pool is exhausted
    pub fn allocate(&mut self) -> Option<SubBuffer> {
        let index = self.free.pop()?;
        self.allocated[index as usize] = true;
        self.logger.debug(format_args!(
            "Allocated slot {index} from '{}' ({} left)",
            self.name,
            self.free.len()
        ));
        Some(SubBuffer {
            pool: self.id,
            index,
            buffer: self.buffer,
            offset: u64::from(index) * self.slot_size,
            size: self.element_size,
            descriptor_set: self.descriptor_sets[index as usize],
        })
    }

    /// Return a slot to the free list
    ///
    /// The caller guarantees the GPU no longer reads from it.
    pub fn free(&mut self, sub_buffer: SubBuffer) {
        if sub_buffer.pool != self.id {
            self.logger.warn(format_args!(
                "Slot {} returned to '{}' belongs to pool {}",
                sub_buffer.index, self.name, sub_buffer.pool
            ));
            return;
        }

        let index = sub_buffer.index;
        let Some(allocated) = self.allocated.get_mut(index as usize) else {
            return;
        };
        if !*allocated {
            self.logger.warn(format_args!(
                "Slot {index} of '{}' freed twice",
                self.name
            ));
            return;
        }

        *allocated = false;
        self.free.push(index);
        self.logger.debug(format_args!(
            "Freed slot {index} of '{}' ({} available)",
            self.name,
            self.free.len()
        ));
    }

    /// Slot currently holding `key`'s data
    pub fn cached(&self, key: &K) -> Option<&SubBuffer> {
        self.cache.get(key)
    }

    /// Slot for `key`, allocating a fresh one when none is cached or `dirty` is set
    ///
    /// The second tuple field is `true` when the slot is fresh and must be
    /// written before use. A slot replaced because of `dirty` is moved to
    /// `retired` along with its cache entry. `None` means the pool is
    /// exhausted; `key` then has no cached slot.
    pub fn acquire(
        &mut self,
        key: K,
        dirty: bool,
        retired: &mut Vec<SubBuffer>,
    ) -> Option<(&SubBuffer, bool)> {
        if dirty {
            if let Some(stale) = self.cache.remove(&key) {
                self.logger.debug(format_args!(
                    "Retiring slot {} of '{}'",
                    stale.index, self.name
                ));
                retired.push(stale);
            }
        }

        let fresh = !self.cache.contains_key(&key);
        if fresh {
            let sub_buffer = self.allocate()?;
            self.cache.insert(key, sub_buffer);
        }
        self.cache.get(&key).map(|sub_buffer| (sub_buffer, fresh))
    }

    /// Drop `key`'s cache entry, handing its slot back for deferred release
    pub fn evict(&mut self, key: &K) -> Option<SubBuffer> {
        self.cache.remove(key)
    }

    /// Keys currently holding a slot
    pub fn cached_keys(&self) -> impl Iterator<Item = &K> {
        self.cache.keys()
    }

    /// Release the descriptor sets, buffer and memory
    ///
    /// Safe to call more than once and on a partially constructed pool. The
    /// GPU must be idle with respect to this pool.
    pub fn destroy<D: GraphicsDevice + ?Sized>(&mut self, device: &D) {
        if self.buffer.is_null() && self.memory.is_null() && self.descriptor_sets.is_empty() {
            return;
        }

        self.cache.clear();
        if !self.descriptor_sets.is_empty() {
            device.free_descriptor_sets(&self.descriptor_sets);
            self.descriptor_sets.clear();
        }
        device.destroy_buffer(self.buffer);
        device.free_memory(self.memory);
        self.buffer = BufferHandle::NULL;
        self.memory = MemoryHandle::NULL;
        self.free.clear();
        self.allocated.iter_mut().for_each(|slot| *slot = false);

        self.logger
            .info(format_args!("Destroyed buffer pool '{}'", self.name));
    }
}

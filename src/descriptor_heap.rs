// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Descriptor heaps.
//!
//! # Overview
//!
//! Binding sets write their descriptors into a CPU-side heap and copy them into the
//! shader-visible heap that command lists bind.  [`StaticDescriptorHeap`] is a bitmap allocator
//! over both: it finds a contiguous free range of slots, and when there is none it grows both
//! heaps to the next power of two.
//!
//! Growing replaces the shader-visible heap, so every command list has to bind it again.  The
//! heap's *generation* changes whenever that happens; command lists compare it with the
//! generation they last bound.

use crate::bittricks::next_power_of_two;
use crate::error::Error;
use crate::resources::{ResourceId, TextureSubresourceSet};

/// First slot of a descriptor range.
pub type DescriptorIndex = u32;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorHeapType {
    ShaderResource,
    Sampler,
}

impl DescriptorHeapType {
    /// Largest heap the native APIs allow to be shader visible.
    pub fn max_descriptors(self) -> u32 {
        match self {
            DescriptorHeapType::ShaderResource => 1_000_000,
            DescriptorHeapType::Sampler => 2048,
        }
    }
}

/// Contents of one heap slot.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Descriptor {
    #[default]
    Null,
    TextureSrv {
        texture: ResourceId,
        subresources: TextureSubresourceSet,
    },
    TextureUav {
        texture: ResourceId,
        subresources: TextureSubresourceSet,
    },
    BufferSrv {
        buffer: ResourceId,
    },
    BufferUav {
        buffer: ResourceId,
    },
    ConstantBuffer {
        buffer: ResourceId,
        address: u64,
    },
    AccelStruct {
        address: u64,
    },
    Sampler {
        id: u32,
    },
}

#[derive(Debug)]
pub struct StaticDescriptorHeap {
    heap_type: DescriptorHeapType,
    cpu_descriptors: Vec<Descriptor>,
    shader_visible: Vec<Descriptor>,
    allocated: Vec<bool>,
    search_start: u32,
    num_allocated: u32,
    generation: u64,
}

impl StaticDescriptorHeap {
    pub fn new(heap_type: DescriptorHeapType, num_descriptors: u32) -> Self {
        let n = num_descriptors as usize;
        StaticDescriptorHeap {
            heap_type,
            cpu_descriptors: vec![Descriptor::Null; n],
            shader_visible: vec![Descriptor::Null; n],
            allocated: vec![false; n],
            search_start: 0,
            num_allocated: 0,
            generation: 1,
        }
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    pub fn num_descriptors(&self) -> u32 {
        self.allocated.len() as u32
    }

    pub fn num_allocated(&self) -> u32 {
        self.num_allocated
    }

    /// Changes whenever the shader-visible heap is replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reserves `count` contiguous slots.
    pub fn allocate_descriptors(&mut self, count: u32) -> Result<DescriptorIndex, Error> {
        if count == 0 {
            return Err(Error::Usage("Attempted to allocate an empty descriptor range".to_owned()));
        }
        let num_descriptors = self.num_descriptors();
        let mut found = None;
        let mut free_count = 0;
        for index in self.search_start..num_descriptors {
            if self.allocated[index as usize] {
                free_count = 0;
            } else {
                free_count += 1;
            }
            if free_count >= count {
                found = Some(index + 1 - count);
                break;
            }
        }

        let found_index = match found {
            Some(index) => index,
            None => {
                self.grow(num_descriptors + count)?;
                num_descriptors
            }
        };

        for slot in &mut self.allocated[found_index as usize..(found_index + count) as usize] {
            *slot = true;
        }
        self.num_allocated += count;
        self.search_start = found_index + count;
        Ok(found_index)
    }

    pub fn allocate_descriptor(&mut self) -> Result<DescriptorIndex, Error> {
        self.allocate_descriptors(1)
    }

    /// Returns slots to the heap.  Releasing a slot that isn't allocated is an error and leaves
    /// the heap unchanged.
    pub fn release_descriptors(
        &mut self,
        base_index: DescriptorIndex,
        count: u32,
    ) -> Result<(), Error> {
        let range = base_index as usize..(base_index + count) as usize;
        if range.end > self.allocated.len() || self.allocated[range.clone()].iter().any(|a| !a) {
            return Err(Error::Usage(format!(
                "Attempted to release an un-allocated descriptor range {base_index}..{}",
                base_index + count
            )));
        }
        for index in range {
            self.allocated[index] = false;
            self.cpu_descriptors[index] = Descriptor::Null;
        }
        self.num_allocated -= count;
        if self.search_start > base_index {
            self.search_start = base_index;
        }
        Ok(())
    }

    pub fn write(&mut self, index: DescriptorIndex, descriptor: Descriptor) {
        if let Some(slot) = self.cpu_descriptors.get_mut(index as usize) {
            *slot = descriptor;
        }
    }

    pub fn cpu_descriptor(&self, index: DescriptorIndex) -> Option<&Descriptor> {
        self.cpu_descriptors.get(index as usize)
    }

    pub fn shader_visible_descriptor(&self, index: DescriptorIndex) -> Option<&Descriptor> {
        self.shader_visible.get(index as usize)
    }

    pub fn copy_to_shader_visible_heap(&mut self, index: DescriptorIndex, count: u32) {
        let range = index as usize..(index + count) as usize;
        self.shader_visible[range.clone()].clone_from_slice(&self.cpu_descriptors[range]);
    }

    fn grow(&mut self, min_required: u32) -> Result<(), Error> {
        let new_size = next_power_of_two(min_required);
        if new_size > self.heap_type.max_descriptors() {
            return Err(Error::DescriptorHeapFull {
                requested: min_required - self.num_descriptors(),
            });
        }
        logwise::info_sync!(
            "growing {heap} descriptor heap from {old_size} to {new_size}",
            heap = logwise::privacy::LogIt(self.heap_type),
            old_size = self.num_descriptors(),
            new_size = new_size
        );
        let n = new_size as usize;
        self.cpu_descriptors.resize(n, Descriptor::Null);
        self.allocated.resize(n, false);
        //a new shader-visible heap, with the old contents copied over
        let mut shader_visible = vec![Descriptor::Null; n];
        shader_visible[..self.shader_visible.len()].clone_from_slice(&self.shader_visible);
        self.shader_visible = shader_visible;
        self.generation += 1;
        Ok(())
    }
}

/// The two heaps a device binds, shared by its binding sets.
#[derive(Debug)]
pub struct DescriptorHeaps {
    pub shader_resource: StaticDescriptorHeap,
    pub sampler: StaticDescriptorHeap,
}

impl DescriptorHeaps {
    pub fn new(shader_resource_size: u32, sampler_size: u32) -> Self {
        DescriptorHeaps {
            shader_resource: StaticDescriptorHeap::new(
                DescriptorHeapType::ShaderResource,
                shader_resource_size,
            ),
            sampler: StaticDescriptorHeap::new(DescriptorHeapType::Sampler, sampler_size),
        }
    }

    /// Changes whenever either shader-visible heap is replaced.
    pub fn generation(&self) -> u64 {
        self.shader_resource.generation() + self.sampler.generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_ranges() {
        let mut heap = StaticDescriptorHeap::new(DescriptorHeapType::ShaderResource, 8);
        assert_eq!(heap.allocate_descriptors(3).expect("a"), 0);
        assert_eq!(heap.allocate_descriptors(2).expect("b"), 3);
        heap.release_descriptors(0, 3).expect("release");
        //search restarts at the released range
        assert_eq!(heap.allocate_descriptors(2).expect("c"), 0);
        assert_eq!(heap.num_allocated(), 4);
        assert_eq!(heap.generation(), 1);
    }

    #[test]
    fn grows_to_power_of_two_and_keeps_contents() {
        let mut heap = StaticDescriptorHeap::new(DescriptorHeapType::ShaderResource, 4);
        let a = heap.allocate_descriptors(3).expect("a");
        heap.write(a, Descriptor::BufferSrv { buffer: ResourceId::next() });
        heap.copy_to_shader_visible_heap(a, 3);
        let before = heap.shader_visible_descriptor(a).cloned();

        let b = heap.allocate_descriptors(3).expect("b");
        assert_eq!(b, 4);
        assert_eq!(heap.num_descriptors(), 8);
        assert_eq!(heap.generation(), 2);
        assert_eq!(heap.shader_visible_descriptor(a).cloned(), before);
    }

    #[test]
    fn double_release_is_refused() {
        let mut heap = StaticDescriptorHeap::new(DescriptorHeapType::Sampler, 4);
        let a = heap.allocate_descriptor().expect("a");
        heap.release_descriptors(a, 1).expect("first");
        assert!(heap.release_descriptors(a, 1).is_err());
        assert!(heap.release_descriptors(100, 1).is_err());
    }

    #[test]
    fn growth_is_bounded() {
        let mut heap = StaticDescriptorHeap::new(DescriptorHeapType::Sampler, 2048);
        heap.allocate_descriptors(2048).expect("fill");
        assert!(matches!(
            heap.allocate_descriptors(1),
            Err(Error::DescriptorHeapFull { requested: 1 })
        ));
    }
}

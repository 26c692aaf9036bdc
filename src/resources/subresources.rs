// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Subresource selectors.

use crate::resources::TextureDesc;

/// A range of mip levels and array slices of one texture.
///
/// Counts may exceed the texture; [`TextureSubresourceSet::resolve`] clamps them.  Use
/// [`TextureSubresourceSet::ALL`] to select everything.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureSubresourceSet {
    pub base_mip_level: u32,
    pub num_mip_levels: u32,
    pub base_array_slice: u32,
    pub num_array_slices: u32,
}

impl TextureSubresourceSet {
    pub const ALL: TextureSubresourceSet = TextureSubresourceSet {
        base_mip_level: 0,
        num_mip_levels: u32::MAX,
        base_array_slice: 0,
        num_array_slices: u32::MAX,
    };

    pub fn new(
        base_mip_level: u32,
        num_mip_levels: u32,
        base_array_slice: u32,
        num_array_slices: u32,
    ) -> Self {
        TextureSubresourceSet {
            base_mip_level,
            num_mip_levels,
            base_array_slice,
            num_array_slices,
        }
    }

    /// Exactly one subresource.
    pub fn single(mip_level: u32, array_slice: u32) -> Self {
        Self::new(mip_level, 1, array_slice, 1)
    }

    /// Clamps the selector to the texture.  With `single_mip_level` only the base mip is kept.
    /// Non-array textures always resolve to slice 0.
    pub fn resolve(&self, desc: &TextureDesc, single_mip_level: bool) -> TextureSubresourceSet {
        let num_mip_levels = if single_mip_level {
            1
        } else {
            let last = self.base_mip_level.saturating_add(self.num_mip_levels).min(desc.mip_levels);
            last.saturating_sub(self.base_mip_level)
        };
        let (base_array_slice, num_array_slices) = if desc.dimension.is_array() {
            let last = self
                .base_array_slice
                .saturating_add(self.num_array_slices)
                .min(desc.array_size);
            (self.base_array_slice, last.saturating_sub(self.base_array_slice))
        } else {
            (0, 1)
        };
        TextureSubresourceSet {
            base_mip_level: self.base_mip_level,
            num_mip_levels,
            base_array_slice,
            num_array_slices,
        }
    }

    pub fn is_entire_texture(&self, desc: &TextureDesc) -> bool {
        let end_mip = self.base_mip_level.saturating_add(self.num_mip_levels);
        if self.base_mip_level > 0 || end_mip < desc.mip_levels {
            return false;
        }
        if desc.dimension.is_array()
            && (self.base_array_slice > 0
                || self.base_array_slice.saturating_add(self.num_array_slices) < desc.array_size)
        {
            return false;
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.num_mip_levels == 0 || self.num_array_slices == 0
    }

    /// Iterates `(mip_level, array_slice)` pairs, slice-major.  Call on a resolved set.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let mips = self.base_mip_level..self.base_mip_level + self.num_mip_levels;
        (self.base_array_slice..self.base_array_slice + self.num_array_slices)
            .flat_map(move |slice| mips.clone().map(move |mip| (mip, slice)))
    }
}

impl Default for TextureSubresourceSet {
    fn default() -> Self {
        Self::ALL
    }
}

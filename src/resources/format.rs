// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Texel formats.

Only the properties the barrier code cares about are modelled: block size for upload pitch
computation, and the depth/stencil aspects that decide image aspects and plane counts.
*/

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum Format {
    #[default]
    Unknown,
    R8Unorm,
    R32Uint,
    R32Float,
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba16Float,
    Rgba32Float,
    D16,
    D24S8,
    D32,
    D32S8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FormatInfo {
    pub bytes_per_block: u32,
    pub has_depth: bool,
    pub has_stencil: bool,
}

impl Format {
    pub fn info(self) -> FormatInfo {
        let (bytes_per_block, has_depth, has_stencil) = match self {
            Format::Unknown => (0, false, false),
            Format::R8Unorm => (1, false, false),
            Format::R32Uint | Format::R32Float => (4, false, false),
            Format::Rgba8Unorm | Format::Bgra8Unorm => (4, false, false),
            Format::Rgba16Float => (8, false, false),
            Format::Rgba32Float => (16, false, false),
            Format::D16 => (2, true, false),
            Format::D24S8 => (4, true, true),
            Format::D32 => (4, true, false),
            Format::D32S8 => (8, true, true),
        };
        FormatInfo {
            bytes_per_block,
            has_depth,
            has_stencil,
        }
    }

    pub fn is_depth_stencil(self) -> bool {
        let info = self.info();
        info.has_depth || info.has_stencil
    }

    /// Number of planes a D3D12-style backend addresses separately.  Depth-stencil formats
    /// carry the stencil in a second plane.
    pub fn plane_count(self) -> u32 {
        if self.info().has_stencil { 2 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::Format;

    #[test]
    fn planes() {
        assert_eq!(Format::Rgba8Unorm.plane_count(), 1);
        assert_eq!(Format::D32.plane_count(), 1);
        assert_eq!(Format::D24S8.plane_count(), 2);
        assert!(Format::D16.is_depth_stencil());
        assert!(!Format::R32Float.is_depth_stencil());
    }
}

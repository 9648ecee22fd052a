use super::Pooled;
use crate::errors::Result;
use crate::gpu::{Extent, GpuBackend, TextureId};

/// An RGBA8 texture keyed by its size.
#[derive(Debug, PartialEq, Eq)]
pub struct PooledTexture {
    id: TextureId,
    extent: Extent,
    mip_levels: u32,
}

impl PooledTexture {
    pub(crate) fn create(gpu: &dyn GpuBackend, extent: Extent, mip_levels: u32) -> Result<Self> {
        let id = gpu.create_texture(extent, mip_levels)?;
        Ok(Self {
            id,
            extent,
            mip_levels,
        })
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> TextureId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    #[inline]
    #[must_use]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

impl Pooled for PooledTexture {
    type Key = Extent;

    fn key(&self) -> Extent {
        self.extent
    }
}

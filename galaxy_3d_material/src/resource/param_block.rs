/// Parameter block buffers owned by a material.
///
/// Every constant buffer a material allocates lives in one `ParamBlockTable`
/// and is referenced elsewhere by `ParamBlockKey` only. Shared blocks are
/// referenced by every stage declaring them; private blocks by exactly one.
///
/// Each block keeps a CPU-side copy of its contents. Writes land in that copy
/// and mark the block dirty; `flush()` uploads dirty copies to the GPU buffer.

use slotmap::{new_key_type, SlotMap};
use crate::error::Result;
use crate::engine_bail;
use crate::renderer::{Buffer, BufferDesc, BufferUsage, Renderer};

new_key_type! {
    /// Stable key of a block in a `ParamBlockTable`
    pub struct ParamBlockKey;
}

// ===== PARAM BLOCK =====

/// One allocated parameter block
pub struct ParamBlock {
    name: String,
    data: Vec<u8>,
    usage: BufferUsage,
    shared: bool,
    dirty: bool,
    buffer: Box<dyn Buffer>,
}

impl ParamBlock {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// CPU-side copy of the block contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Whether the block is referenced by several stages
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Whether the CPU copy changed since the last flush
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn buffer(&self) -> &dyn Buffer {
        self.buffer.as_ref()
    }

    /// Write `bytes` at `offset` in the CPU copy
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = offset + bytes.len();
        if end > self.data.len() {
            engine_bail!("galaxy3d::ParamBlock", InternalError,
                "Write of {} bytes at offset {} overflows parameter block '{}' ({} bytes)",
                bytes.len(), offset, self.name, self.data.len());
        }
        self.data[offset..end].copy_from_slice(bytes);
        self.dirty = true;
        Ok(())
    }

    /// Upload the CPU copy to the GPU buffer if it changed
    ///
    /// Returns true if an upload happened.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.buffer.update(0, &self.data)?;
        self.dirty = false;
        Ok(true)
    }
}

// ===== PARAM BLOCK TABLE =====

/// Arena of every parameter block owned by a material
#[derive(Default)]
pub struct ParamBlockTable {
    blocks: SlotMap<ParamBlockKey, ParamBlock>,
}

impl ParamBlockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a GPU buffer of `size` bytes and register it as a block
    pub fn allocate(
        &mut self,
        renderer: &mut dyn Renderer,
        name: &str,
        size: u32,
        usage: BufferUsage,
        shared: bool,
    ) -> Result<ParamBlockKey> {
        let buffer = renderer.create_buffer(BufferDesc { size: size as u64, usage })?;

        Ok(self.blocks.insert(ParamBlock {
            name: name.to_string(),
            data: vec![0u8; size as usize],
            usage,
            shared,
            dirty: false,
            buffer,
        }))
    }

    /// Drop every block (and its GPU buffer)
    pub fn release_all(&mut self) {
        self.blocks.clear();
    }

    pub fn get(&self, key: ParamBlockKey) -> Option<&ParamBlock> {
        self.blocks.get(key)
    }

    pub fn get_mut(&mut self, key: ParamBlockKey) -> Option<&mut ParamBlock> {
        self.blocks.get_mut(key)
    }

    pub fn contains(&self, key: ParamBlockKey) -> bool {
        self.blocks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of blocks shared between stages
    pub fn shared_count(&self) -> usize {
        self.blocks.values().filter(|b| b.shared).count()
    }

    /// Number of blocks private to one stage
    pub fn private_count(&self) -> usize {
        self.blocks.values().filter(|b| !b.shared).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamBlockKey, &ParamBlock)> {
        self.blocks.iter()
    }

    /// Upload every dirty block, returning how many were uploaded
    pub fn flush_dirty(&mut self) -> Result<usize> {
        let mut uploaded = 0;
        for block in self.blocks.values_mut() {
            if block.flush()? {
                uploaded += 1;
            }
        }
        Ok(uploaded)
    }
}

#[cfg(test)]
#[path = "param_block_tests.rs"]
mod tests;

/// Mock Renderer for unit tests (no GPU required)
///
/// Tracks every buffer it creates (size, usage, live count, uploaded bytes)
/// so material tests can check allocation and release behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::engine_bail;
use crate::error::Result;
use crate::renderer::{
    Buffer, BufferDesc, BufferUsage, Renderer, SamplerDesc, SamplerState, Texture,
    TextureDimension, TextureInfo,
};

// ============================================================================
// Buffer tracking
// ============================================================================

/// Record of one buffer created by the mock renderer
#[derive(Debug, Clone)]
pub struct MockBufferRecord {
    pub size: u64,
    pub usage: BufferUsage,
    pub contents: Arc<Mutex<Vec<u8>>>,
}

/// Shared view over the buffers created by a MockRenderer
///
/// Clone it before handing the renderer to a material.
#[derive(Debug, Clone, Default)]
pub struct MockBufferTracker {
    created: Arc<Mutex<Vec<MockBufferRecord>>>,
    live: Arc<AtomicUsize>,
}

impl MockBufferTracker {
    /// Number of buffers ever created
    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    /// Number of buffers not dropped yet
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// All creation records, in creation order
    pub fn records(&self) -> Vec<MockBufferRecord> {
        self.created.lock().unwrap().clone()
    }

    /// Bytes last uploaded to the buffer created at `index`
    pub fn contents(&self, index: usize) -> Vec<u8> {
        self.created.lock().unwrap()[index].contents.lock().unwrap().clone()
    }
}

// ============================================================================
// Mock Buffer
// ============================================================================

#[derive(Debug)]
pub struct MockBuffer {
    size: u64,
    contents: Arc<Mutex<Vec<u8>>>,
    live: Arc<AtomicUsize>,
}

impl Buffer for MockBuffer {
    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset + data.len() as u64;
        if end > self.size {
            engine_bail!("galaxy3d::mock", BackendError,
                "Write of {} bytes at offset {} exceeds buffer size {}",
                data.len(), offset, self.size);
        }
        let mut contents = self.contents.lock().unwrap();
        contents[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Mock Texture / Sampler
// ============================================================================

#[derive(Debug)]
pub struct MockTexture {
    pub info: TextureInfo,
    pub name: String,
}

impl MockTexture {
    pub fn new(width: u32, height: u32, name: &str) -> Self {
        Self {
            info: TextureInfo { width, height, dimension: TextureDimension::D2 },
            name: name.to_string(),
        }
    }
}

impl Texture for MockTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }
}

#[derive(Debug, Default)]
pub struct MockSampler {
    pub desc: SamplerDesc,
}

impl SamplerState for MockSampler {
    fn desc(&self) -> &SamplerDesc {
        &self.desc
    }
}

// ============================================================================
// Mock Renderer
// ============================================================================

/// Mock Renderer that tracks created buffers without GPU
#[derive(Debug, Default)]
pub struct MockRenderer {
    tracker: MockBufferTracker,
    max_live_buffers: Option<usize>,
    api_name: Option<String>,
}

impl MockRenderer {
    /// API name reported by default
    pub const API_NAME: &'static str = "mock";

    /// Create a new mock renderer
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail buffer creation with OutOfMemory once `max` buffers are alive
    pub fn with_buffer_limit(mut self, max: usize) -> Self {
        self.max_live_buffers = Some(max);
        self
    }

    /// Report a different API name
    pub fn with_api_name(mut self, name: &str) -> Self {
        self.api_name = Some(name.to_string());
        self
    }

    /// Handle for inspecting created buffers
    pub fn tracker(&self) -> MockBufferTracker {
        self.tracker.clone()
    }
}

impl Renderer for MockRenderer {
    fn api_name(&self) -> &str {
        self.api_name.as_deref().unwrap_or(Self::API_NAME)
    }

    fn create_buffer(&mut self, desc: BufferDesc) -> Result<Box<dyn Buffer>> {
        if let Some(max) = self.max_live_buffers {
            if self.tracker.live_count() >= max {
                return Err(crate::error::Error::OutOfMemory);
            }
        }

        let contents = Arc::new(Mutex::new(vec![0u8; desc.size as usize]));
        self.tracker.created.lock().unwrap().push(MockBufferRecord {
            size: desc.size,
            usage: desc.usage,
            contents: contents.clone(),
        });
        self.tracker.live.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockBuffer {
            size: desc.size,
            contents,
            live: self.tracker.live.clone(),
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "mock_renderer_tests.rs"]
mod tests;

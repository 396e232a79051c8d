/*!
# Galaxy 3D Material

Material system of the Galaxy 3D rendering engine.

A material binds a shader (named, typed parameters plus one technique per
graphics API) to the compiled GPU programs of its best technique. Setting
the shader reconciles the reflected layouts of every program, allocates the
constant buffers the passes need, and builds one parameter set per stage.
Parameter writes then reach every stage that reads them.

## Architecture

- **Renderer**: backend trait used to create constant buffers
- **GpuProgram**: reflected parameter layout of one compiled program
- **Shader / Technique / Pass**: what a material can bind, per graphics API
- **ParamReconciler**: cross-program consistency checks
- **StageParams**: per-stage parameter bindings
- **Material**: resolution and the typed get/set facade

Backends provide concrete types for the renderer, buffer, texture and
sampler traits.
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod renderer;
pub mod resource;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton
    pub use crate::engine::Engine;

    // Renderer factory trait
    pub use crate::renderer::Renderer;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger, MemoryLogger};
        // Note: engine_* macros are NOT re-exported here - they are internal only
    }

    // Render sub-module with all backend-facing types
    pub mod render {
        pub use crate::renderer::*;
    }

    // Resource sub-module
    pub mod resource {
        pub use crate::resource::*;
    }
}

// Re-export math library at crate root
pub use glam;

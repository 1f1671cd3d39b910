/*!
# Nova 3D Engine

Core traits and types for the Nova 3D rendering engine.

This crate provides the platform-agnostic frame rendering and GPU
resource-lifecycle API using trait-based dynamic polymorphism. Backend
implementations (Vulkan, etc.) register themselves at runtime through the
engine's backend registry.

## Architecture

- **GraphicsDevice**: Factory and frame-synchronization trait
- **CommandList**: Command recording trait
- **RenderStage**: Per-frame render pass contract
- **FrameScheduler**: Frame pacing, stage execution and presentation
- **SceneRenderStage / ShadowMapStage**: Built-in render stages

Backend implementations provide concrete types that implement the GPU
traits; `gpu::mock_device` provides an in-memory backend for tests.
*/

// Internal modules
mod config;
mod engine;
mod error;
pub mod log;
pub mod frame;
pub mod gpu;
pub mod resource;
pub mod scene;
pub mod shadow;

// Main nova3d namespace module
pub mod nova3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton
    pub use crate::engine::{BackendFactory, Engine};

    // Engine configuration
    pub use crate::config::EngineConfig;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
        // Note: engine_* macros are NOT re-exported here - they are internal only
    }

    // GPU abstraction sub-module with all device-facing types
    pub mod gpu {
        pub use crate::gpu::*;
        pub use crate::gpu::mock_device;
    }

    // Frame loop sub-module
    pub mod frame {
        pub use crate::frame::*;
    }

    // Resource lifecycle sub-module
    pub mod resource {
        pub use crate::resource::*;
    }

    // Scene sub-module
    pub mod scene {
        pub use crate::scene::*;
    }

    // Shadow mapping sub-module
    pub mod shadow {
        pub use crate::shadow::*;
    }
}

// Re-export math library at crate root
pub use glam;

//! Error types for the Nova3D engine
//!
//! This module defines the error types used throughout the engine,
//! including rendering, frame scheduling, and resource management.

use std::fmt;

/// Result type for Nova3D engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Nova3D engine errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (Vulkan, DirectX, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (texture, buffer, shader, etc.)
    InvalidResource(String),

    /// Initialization failed (engine, device, subsystems)
    InitializationFailed(String),

    /// A fixed-capacity table (images, materials, lights, shadow maps)
    /// overflowed. Capacities are a configuration-time contract, so this
    /// is not recoverable.
    CapacityExceeded {
        /// Which table overflowed (e.g. "images", "materials")
        table: &'static str,
        /// The configured capacity that was exceeded
        capacity: usize,
    },

    /// A frame-completion fence did not signal within the bounded wait
    FenceTimeout {
        /// Frame slot whose fence timed out
        frame_slot: usize,
    },

    /// An upstream invariant was broken (e.g. a mesh with zero surfaces,
    /// a write to an undeclared binding point)
    ContractViolation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::CapacityExceeded { table, capacity } => {
                write!(f, "Capacity exceeded: {} table is full ({} entries)", table, capacity)
            }
            Error::FenceTimeout { frame_slot } => {
                write!(f, "Fence timeout: frame slot {} never completed", frame_slot)
            }
            Error::ContractViolation(msg) => write!(f, "Contract violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ===== ERROR MACROS =====

/// Log an ERROR and construct the matching engine error
///
/// # Example
///
/// ```no_run
/// # use nova_3d_engine::engine_err;
/// # fn lookup_material(id: u32) -> Result<(), nova_3d_engine::nova3d::Error> {
/// return Err(engine_err!("nova3d::Scene", InvalidResource, "unknown material id {}", id));
/// # }
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $variant:ident, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::nova3d::Error::$variant(message)
    }};
}

/// Log an ERROR and early-return the matching engine error
///
/// # Example
///
/// ```no_run
/// # use nova_3d_engine::engine_bail;
/// # fn validate_mesh(mesh_id: u32) -> Result<(), nova_3d_engine::nova3d::Error> {
/// engine_bail!("nova3d::Scene", ContractViolation, "mesh {} has no surfaces", mesh_id);
/// # }
/// ```
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $variant:ident, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $variant, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

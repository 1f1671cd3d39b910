/// Nova3D Engine - Singleton manager for engine subsystems
///
/// This module provides global singleton management for the logger and the
/// graphics backend registry. It uses thread-safe static storage with
/// RwLock for safe concurrent access.

use std::sync::{OnceLock, RwLock, Arc};
use std::time::SystemTime;
use rustc_hash::FxHashMap;
use winit::window::Window;
use crate::config::EngineConfig;
use crate::error::{Result, Error};
use crate::gpu::GraphicsDevice;
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

// ===== INTERNAL STATE =====

/// Factory function registered by a backend crate (e.g. the Vulkan backend)
pub type BackendFactory = fn(&Window, &EngineConfig) -> Result<Arc<dyn GraphicsDevice>>;

/// Global backend registry
static BACKENDS: OnceLock<RwLock<FxHashMap<&'static str, BackendFactory>>> = OnceLock::new();

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

// ===== PUBLIC API =====

/// Main engine singleton manager
///
/// Manages the global logger and the graphics backend registry. Backends
/// register a factory at startup; the application then creates a device
/// by backend name.
///
/// # Example
///
/// ```no_run
/// use nova_3d_engine::nova3d::{Engine, EngineConfig};
///
/// # let window: winit::window::Window = unimplemented!();
/// nova_3d_engine_renderer_vulkan::register();
/// let device = Engine::create_device("vulkan", &window, &EngineConfig::default())?;
/// # Ok::<(), nova_3d_engine::nova3d::Error>(())
/// ```
pub struct Engine;

impl Engine {
    /// Helper to log errors before returning them (internal use)
    fn log_and_return_error(error: Error) -> Error {
        crate::engine_error!("nova3d::Engine", "{}", error);
        error
    }

    /// Register a graphics backend factory under a name
    ///
    /// Called by backend crates (e.g. `nova_3d_engine_renderer_vulkan::register()`).
    /// Registering the same name twice replaces the previous factory.
    pub fn register_backend(name: &'static str, factory: BackendFactory) {
        let backends = BACKENDS.get_or_init(|| RwLock::new(FxHashMap::default()));
        if let Ok(mut lock) = backends.write() {
            lock.insert(name, factory);
        }
        crate::engine_info!("nova3d::Engine", "Registered graphics backend '{}'", name);
    }

    /// Create a graphics device from a registered backend
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No backend is registered under `name`
    /// - The configuration fails validation
    /// - The backend itself fails to initialize
    pub fn create_device(
        name: &str,
        window: &Window,
        config: &EngineConfig,
    ) -> Result<Arc<dyn GraphicsDevice>> {
        config.validate()?;
        let backends = BACKENDS.get_or_init(|| RwLock::new(FxHashMap::default()));
        let factory = {
            let lock = backends.read().map_err(|_| {
                Self::log_and_return_error(Error::BackendError(
                    "Backend registry lock poisoned".to_string(),
                ))
            })?;
            lock.get(name).copied().ok_or_else(|| {
                Self::log_and_return_error(Error::InitializationFailed(format!(
                    "No graphics backend registered under '{}'",
                    name
                )))
            })?
        };
        let device = factory(window, config)?;
        crate::engine_info!("nova3d::Engine", "Graphics device '{}' created successfully", name);
        Ok(device)
    }

    /// Returns true if a backend factory is registered under `name`
    pub fn backend_registered(name: &str) -> bool {
        BACKENDS
            .get()
            .and_then(|backends| backends.read().ok().map(|lock| lock.contains_key(name)))
            .unwrap_or(false)
    }

    /// Remove all registered backends (only available in test builds)
    #[cfg(test)]
    pub fn reset_for_testing() {
        if let Some(backends) = BACKENDS.get() {
            if let Ok(mut lock) = backends.write() {
                lock.clear();
            }
        }
    }

    // ===== LOGGING API =====

    /// Set a custom logger
    ///
    /// Replace the default logger with a custom implementation (file logger,
    /// network logger, etc.)
    ///
    /// # Example
    ///
    /// ```no_run
    /// use nova_3d_engine::nova3d::{Engine, log::{Logger, LogEntry}};
    ///
    /// struct FileLogger;
    /// impl Logger for FileLogger {
    ///     fn log(&self, entry: &LogEntry) {
    ///         // Write to file...
    ///     }
    /// }
    ///
    /// Engine::set_logger(FileLogger);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(mut lock) = logger_lock.write() {
            *lock = Box::new(logger);
        }
    }

    /// Reset logger to default (DefaultLogger)
    pub fn reset_logger() {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(mut lock) = logger_lock.write() {
            *lock = Box::new(DefaultLogger);
        }
    }

    /// Internal logging method (for simple logs without file:line)
    ///
    /// Used by macros like engine_info!, engine_warn!, etc.
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(lock) = logger_lock.read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: None,
                line: None,
            });
        }
    }

    /// Internal logging method with file:line information (for ERROR logs)
    ///
    /// Used by the engine_error! macro to include source location.
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(lock) = logger_lock.read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: Some(file),
                line: Some(line),
            });
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

/// Frame module - the per-frame render loop and its stage contract

// Module declarations
pub mod scheduler;
pub mod stage;

// Re-export from each module
pub use scheduler::*;
pub use stage::*;

/// GPU abstraction module - backend-neutral resource and command traits

// Module declarations
pub mod binding;
pub mod buffer;
pub mod command_list;
pub mod device;
pub mod mock_device;
pub mod shader;
pub mod texture;

// Re-export from each module
pub use binding::*;
pub use buffer::*;
pub use command_list::*;
pub use device::*;
pub use shader::*;
pub use texture::*;

mod error;
mod mock_device;
mod net_device;
mod registry;
mod traits;

pub use error::*;
pub use mock_device::*;
pub use net_device::*;
pub use registry::*;
pub use traits::*;

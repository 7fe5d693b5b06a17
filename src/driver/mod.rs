pub mod dummy;
pub mod loopback;

pub use dummy::Dummy;
pub use loopback::{Loopback, LoopbackQueue};

mod controller;
mod error;
mod traits;

pub use controller::*;
pub use error::*;
pub use traits::*;

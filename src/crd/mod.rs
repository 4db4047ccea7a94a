mod available;
mod cluster;
mod component;
mod instance_set;
mod lifecycle;

pub use available::*;
pub use cluster::*;
pub use component::*;
pub use instance_set::*;
pub use lifecycle::*;

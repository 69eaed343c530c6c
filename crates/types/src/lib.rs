pub mod clock;
pub mod owner;

pub use clock::*;
pub use owner::*;

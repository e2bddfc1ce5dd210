pub mod df;
pub mod ls;
#[cfg(feature = "fuse")]
pub mod mount;

pub use df::Df;
pub use ls::Ls;
#[cfg(feature = "fuse")]
pub use mount::Mount;

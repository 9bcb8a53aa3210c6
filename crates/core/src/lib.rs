pub mod calls;
pub mod error;
pub mod history;
pub mod host;
pub mod logging;
pub mod preview;
pub mod session;
pub mod tree;

pub use error::Result;

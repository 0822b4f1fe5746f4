pub mod target;
pub mod vuln;

pub use target::*;
pub use vuln::*;

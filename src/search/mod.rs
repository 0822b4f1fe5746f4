//! Header search: find which candidate headers change a response, then prove the change is cached.

pub mod confirm;
pub mod engine;
pub mod oracle;

pub use confirm::confirm_cached;
pub use engine::{header_search, HeaderSearchArgs, SearchOutcome};
pub use oracle::{Decision, Oracle, Reason, BRUTEFORCE_CANARY};

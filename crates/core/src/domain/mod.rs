pub mod recommendation;
pub mod snapshot;

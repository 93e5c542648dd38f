mod dashboard;
mod lead;
mod visitor;

pub use dashboard::*;
pub use lead::*;
pub use visitor::*;

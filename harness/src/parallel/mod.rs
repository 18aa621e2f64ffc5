mod averaging;
mod coordinator;
mod gate;
mod worker;

pub use averaging::ParamAverager;
pub use coordinator::{Coordinator, CoordinatorSettings, Feed, RunSummary};
pub use gate::{RoundGate, Verdict};

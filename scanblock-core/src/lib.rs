pub mod block;
pub mod event;
pub mod phase;
pub mod screen;

pub use block::{BlockContent, BlockSpec};
pub use event::{EventRecord, InputSignal, TimingEstimate, TriggerEvent};
pub use phase::RunPhase;
pub use screen::{MessageStyle, Screen};

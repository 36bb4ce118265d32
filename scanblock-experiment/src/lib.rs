pub mod bus;
pub mod config;
pub mod poller;
pub mod recorder;
pub mod scheduler;
pub mod state;

pub use bus::{BackgroundListener, ConsoleListener, FileListener, Listener, ListenerError, NotificationBus};
pub use config::{ConfigError, RunConfig, Task};
pub use poller::{ChannelSource, FirstTrigger, Poll, ScriptedSource, TriggerError, TriggerPoller, TriggerSource};
pub use recorder::EventRecorder;
pub use scheduler::{
    Presenter, PresenterError, RunOutcome, RunSummary, Scheduler, SchedulerError, SlideResponse,
};
pub use state::{BlockEvent, BlockStateMachine};

pub mod accumulator;
pub mod blocklist;
pub mod calendar;
pub mod clock;
pub mod engine;
pub mod events;
pub mod hostname;
pub mod notify;
pub mod reset;
pub mod surface;
pub mod tracker;

pub use blocklist::{BlockChange, BlockPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Engine, EngineHandle};
pub use events::BrowserEvent;
pub use hostname::hostname_from_url;
pub use notify::{NotifyConfig, NotifyMachine, TimerFire, TimerKind};
pub use surface::{Notifier, TargetId, TargetInfo, TargetSurface};
pub use tracker::{ActiveContext, ActiveContextTracker};

pub mod engine;
pub mod shortcuts;

pub use engine::{AutoSwitchEngine, EvaluationOutcome, SwitchFailure, SwitchRecord, SwitchState};
pub use shortcuts::{KeyChord, ShortcutDispatcher, ShortcutMatch};

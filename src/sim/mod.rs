// src/sim/mod.rs
//
// Trial loop: phase controller, per-trial records and the simulator driver.

pub mod controller;
pub mod record;
pub mod simulator;

pub use controller::{Phase, TrialController, TrialTicket};
pub use record::TrialRecord;
pub use simulator::{QuitFlag, RunOutcome, Simulator};

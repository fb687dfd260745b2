//! Process supervision for Aviary bots.
//!
//! Starts each bot's entry point as a detached child in its own process
//! group, probes liveness after a grace interval, and terminates whole
//! process trees with graceful-then-forceful signalling. Also provisions
//! bot instance directories from a template.

pub mod provisioner;
pub mod supervisor;

pub use provisioner::{BotProvisionSpec, TemplateProvisioner};
pub use supervisor::{ControlOutcome, ProcessSupervisor, SupervisorConfig};

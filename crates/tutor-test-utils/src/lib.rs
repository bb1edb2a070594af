//! Mocks and fixtures shared by the Tutor crates' tests.

mod fixtures;
mod mock_agent;
mod probers;

pub use fixtures::{registry_with, TempData};
pub use mock_agent::MockAgent;
pub use probers::{FailingProber, PendingProber, StaticProber};

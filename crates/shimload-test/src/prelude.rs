//! Prelude module - commonly used test utilities.
//!
//! Use `use shimload_test::prelude::*;` to import them.

pub use crate::{HostEvent, MockFetcher, MockHost};

pub use crate::{chain_host, chain_registry, mock_orchestrator, probed_capability};

pub use crate::init_test_logging;

//! Shimload Test - shared test utilities.
//!
//! Provides a scriptable [`MockHost`] and [`MockFetcher`], plus fixtures for
//! the common two-capability chain.
//!
//! ```toml
//! [dev-dependencies]
//! shimload-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use shimload_test::{chain_host, chain_registry, mock_orchestrator, MockFetcher};
//! use shimload_core::RunOptions;
//!
//! #[tokio::test]
//! async fn test_chain() {
//!     let host = chain_host();
//!     let fetcher = MockFetcher::new().with_script("p.js", "useB()");
//!     let orchestrator = mock_orchestrator(chain_registry().unwrap(), &host, &fetcher);
//!
//!     orchestrator.run(RunOptions::new().execute("p.js")).await.unwrap();
//!     assert_eq!(host.activated(), vec!["A", "B"]);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;

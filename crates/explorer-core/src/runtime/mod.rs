//! Explorer runtime initialization and lifecycle management.
//!
//! The runtime builds one [`NetworkServices`] per configured network and hands them out
//! through a [`NetworkRegistry`] keyed by network name. Services are passed explicitly;
//! there is no global lookup.
//!
//! # Example
//!
//! ```no_run
//! use explorer_core::{config::AppConfig, runtime::ExplorerRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let runtime = ExplorerRuntime::builder().with_config(config).build().await?;
//!
//!     // ... hand runtime.registry() to the transport layer ...
//!
//!     tokio::signal::ctrl_c().await?;
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod lifecycle;
pub mod registry;

pub use builder::{ExplorerRuntimeBuilder, HttpServiceFactory, RuntimeError, ServiceFactory};
pub use lifecycle::ExplorerRuntime;
pub use registry::{NetworkRegistry, NetworkServices};

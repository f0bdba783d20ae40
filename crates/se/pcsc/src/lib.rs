//! PC/SC reader driver for the nexum secure element service
//!
//! [`PcscDeviceManager`] enumerates the readers of the host's PC/SC resource manager and
//! plugs them into [`nexum_se::SeService`]:
//!
//! ```no_run
//! use nexum_se::{SeConfig, SeService};
//! use nexum_se_transport_pcsc::PcscDeviceManager;
//!
//! let manager = PcscDeviceManager::new()?;
//! let service = SeService::open(&manager, SeConfig::default())?;
//! for reader in service.readers()? {
//!     println!("{}", service.reader_name(reader)?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(unused_crate_dependencies)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod manager;
mod reader;
mod transport;

pub use config::{PcscConfig, ShareMode};
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::PcscCardReader;
pub use transport::PcscTransport;

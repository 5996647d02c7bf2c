// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A pure [Rust](https://www.rust-lang.org) client for reading values
//! from [PLCs](https://en.wikipedia.org/wiki/Programmable_logic_controller)
//! based on [tokio](https://tokio.rs).
//!
//! Protocols are implemented by [drivers](driver::Driver) that are looked up
//! by the scheme of a connection string. Built-in drivers:
//!
//! - `modbus`: Modbus TCP, e.g. `modbus:tcp://192.168.222.33?unit-identifier=32`
//! - `s7`: Siemens S7 over ISO-on-TCP, e.g. `s7://192.168.216.121?remote-rack=0&remote-slot=1`
//!
//! Fields are addressed with queries in the dialect of the driver,
//! e.g. `holding-register:2:INT` or `%DB1.DBW8:INT`.
//!
//! ## Installation
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tokio-plc = "*"
//! ```
//!
//! ## Example
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use tokio_plc::prelude::*;
//!
//! let manager = DriverManager::new();
//! let connection = manager
//!     .connect("modbus:tcp://192.168.222.33?unit-identifier=1")
//!     .await?;
//! let request = connection
//!     .read_request_builder()
//!     .add_query("temperature", "holding-register:2:INT")
//!     .build()?;
//! let response = request.execute().await?;
//! if response.response_code("temperature") == ResponseCode::Ok {
//!     println!("{}", response.value("temperature").unwrap());
//! }
//! connection.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(unreachable_pub)]
#![warn(unsafe_code)]
#![warn(clippy::pedantic)]
// Additional restrictions
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::self_named_module_files)]
// Exceptions
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod prelude;

pub mod codec;
pub mod driver;

mod connection;
pub use self::connection::{Connection, ConnectionState};

mod descriptor;
pub use self::descriptor::ConnectionDescriptor;

mod error;
pub use self::error::Error;

pub mod field;
pub use self::field::{DataType, Dialect, FieldDescriptor, MemoryArea};

mod manager;
pub use self::manager::DriverManager;

pub mod options;
pub use self::options::ConnectionOptions;

mod request;
pub use self::request::{ReadRequest, ReadRequestBuilder};

mod response;
pub use self::response::{ReadResponse, ResponseCode, ResponseItem};

mod value;
pub use self::value::ResponseValue;

#[cfg(feature = "modbus")]
#[cfg_attr(docsrs, doc(cfg(feature = "modbus")))]
pub mod modbus;

#[cfg(feature = "s7")]
#[cfg_attr(docsrs, doc(cfg(feature = "s7")))]
pub mod s7;

/// Re-export the `bytes` crate
///
/// Needed to prevent version conflicts with types that are exposed by this crate.
pub use bytes;

/// Specialized [`std::result::Result`] type for all operations of this crate.
pub type Result<T> = std::result::Result<T, Error>;

//! # fedsave - Federated averaging server with model persistence
//!
//! Runs federated-averaging rounds for mobile clients and writes every
//! aggregated parameter set into an on-device model artifact:
//! - **federated**: parameters, weighted aggregation, FedAvg and the saving strategy
//! - **model**: mobile model artifacts and parameter persistence
//! - **server** / **client**: round loop and participants over TCP
//! - **runner**: command dispatcher driving server runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fedsave::runner::{pipe, Command, Dispatcher, ServerLauncher};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (controller, mut channel) = pipe();
//!     controller.send_frame(Command::ping("hello")).unwrap();
//!
//!     let dispatcher = Dispatcher::new(ServerLauncher::default());
//!     let reply = dispatcher.execute(&mut channel).await.unwrap();
//!     println!("{}", reply);
//! }
//! ```

pub mod client;
pub mod core;
pub mod federated;
pub mod model;
pub mod runner;
pub mod server;

pub use core::error::{Error, Result};

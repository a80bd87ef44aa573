//! # Events Module
//!
//! Progress reporting and cancellation shared by scan, listing and ingest.
//!
//! ## Design
//! The engine emits events through channels, allowing any UI (CLI, GUI,
//! web) to subscribe and display progress. A [`CancellationToken`] travels
//! the other way.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Scan(ScanEvent::Progress(p)) = event {
//!             println!("{}/{}", p.done, p.total);
//!         }
//!     }
//! });
//!
//! ReconciliationScan::new(ScanOptions::default()).run(&mut library, &sender, &token)?;
//! ```

mod cancel;
mod channel;
mod types;

pub use cancel::CancellationToken;
pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;

//! Dispatch queue and worker pool for outbound mail
//!
//! This crate provides functionality to:
//! - Accept validated tasks from producers and keep them durable
//! - Hand tasks to a fixed pool of concurrent workers
//! - Deliver through a pluggable [`MailTransport`]
//! - Retry failed deliveries up to a limit before giving up

mod dispatcher;
mod error;
pub mod policy;
pub mod processor;
pub mod queue;
pub mod transport;

pub use courier_common::EmailTask;
pub use dispatcher::Dispatcher;
pub use error::{DeliveryError, EnqueueError};
pub use policy::RetryPolicy;
pub use processor::{DeliveryConfig, DeliveryReceipt, DispatchMode, DrainReport, WorkerPool};
pub use queue::{DispatchQueue, Journal, Lease};
pub use transport::{
    MailTransport, OutboundMessage, TransportError,
    smtp::{SmtpConfig, SmtpSecurity, SmtpTransport},
};

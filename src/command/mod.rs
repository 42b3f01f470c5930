//! Flyweight views over the command ring buffer and broadcast buffer wire
//! formats. Each message definition is a `#[repr(C, packed(4))]` struct
//! overlaid directly on the shared buffer; accessors never copy beyond
//! what callers ask for.

pub mod correlated_message;
pub mod counter_update;
pub mod error_response;
pub mod exclusive_publication_message;
pub mod flyweight;
pub mod image_message;
pub mod operation_succeeded;
pub mod publication_message;
pub mod publication_ready;
pub mod remove_message;
pub mod subscription_message;

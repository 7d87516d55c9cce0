//! # Careline Records
//!
//! The clinic side of the Careline assistant: appointment records behind a
//! [`store::RecordStore`] trait, plus the voice tools that let the
//! conversational endpoint query and change them mid-call.

pub mod store;
pub mod tools;

pub use store::{
    Booking, MemoryRecordStore, PatientProfile, Provider, RecordError, RecordResult, RecordStore,
    Slot,
};
pub use tools::register_all;

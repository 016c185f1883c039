//! ChestVault Core Types
//!
//! This crate provides the fundamental types shared by every ChestVault crate:
//! - Entity keys identifying the owner of a persisted record
//! - The persisted record and slot item types
//! - Core error types

pub mod entity;
pub mod error;
pub mod record;

pub use entity::EntityKey;
pub use error::{Error, Result};
pub use record::{ItemStack, Record, SlotIndex, SlotItem};

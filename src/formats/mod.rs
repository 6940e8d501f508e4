//! Nintendo 3DS container formats.
//!
//! [`Nintendo3ds`] is the entry point; the other modules parse one header
//! type each and can be used on their own.

pub mod cia;
pub mod detect;
pub mod n3ds;
pub mod names;
pub mod ncch;
pub mod ncsd;
pub mod smdh;
pub mod srl;
pub mod threedsx;

#[cfg(test)]
pub(crate) mod testdata;

pub use detect::{ContainerKind, detect};
pub use n3ds::{ContentRange, Nintendo3ds};

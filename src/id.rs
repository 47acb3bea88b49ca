// canconsole/src/id.rs
//
// Implements CANbus Identifiers.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CANbus standard and extended identifiers, and the flag bits that the
//! kernel packs into the same 32-bit ID word.

use bitflags::bitflags;
use embedded_can::{ExtendedId, Id, StandardId};
use libc::canid_t;

pub use libc::{CAN_EFF_FLAG, CAN_EFF_MASK, CAN_ERR_FLAG, CAN_RTR_FLAG, CAN_SFF_MASK};

bitflags! {
    /// Bit flags in the composite SocketCAN ID word.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IdFlags: canid_t {
        /// Indicates frame uses a 29-bit extended ID
        const EFF = CAN_EFF_FLAG;
        /// Indicates a remote request frame.
        const RTR = CAN_RTR_FLAG;
        /// Indicates an error frame.
        const ERR = CAN_ERR_FLAG;
    }
}

/// Gets the canid_t value from an Id
/// If it's an extended ID, the CAN_EFF_FLAG bit is also set.
pub fn id_to_canid_t(id: impl Into<Id>) -> canid_t {
    use Id::*;
    match id.into() {
        Standard(id) => id.as_raw() as canid_t,
        Extended(id) => id.as_raw() | CAN_EFF_FLAG,
    }
}

/// Splits a composite ID word into the identifier and its flags.
pub fn id_from_canid_t(word: canid_t) -> (Id, IdFlags) {
    let flags = IdFlags::from_bits_truncate(word);
    // Masked values always fit, so the fallbacks are never taken
    let id = if flags.contains(IdFlags::EFF) {
        ExtendedId::new(word & CAN_EFF_MASK)
            .unwrap_or(ExtendedId::ZERO)
            .into()
    } else {
        StandardId::new((word & CAN_SFF_MASK) as u16)
            .unwrap_or(StandardId::ZERO)
            .into()
    };
    (id, flags)
}

/// Creates a CAN ID from a raw integer value.
///
/// If the `id` is <= 0x7FF, it's assumed to be a standard ID, otherwise
/// it is created as an Extened ID. If you require an Extended ID <= 0x7FF,
/// create it explicitly.
pub fn id_from_raw(id: u32) -> Option<Id> {
    let id = match id {
        n if n <= CAN_SFF_MASK => StandardId::new(n as u16)?.into(),
        n => ExtendedId::new(n)?.into(),
    };
    Some(id)
}

/// Gets the raw numeric value of the ID, without any flags.
#[inline]
pub fn id_to_raw(id: &Id) -> u32 {
    match id {
        Id::Standard(id) => id.as_raw() as u32,
        Id::Extended(id) => id.as_raw(),
    }
}

/////////////////////////////////////////////////////////////////////////////

//! Global family decoder registry.
//!
//! A family decoder maps a sub-id to a fresh, empty instance of the concrete
//! type; `deserialize` then asks the instance to read its own state. Each
//! family registers once. The core family is present from the first lookup.

use std::sync::LazyLock;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::NIL_DID;
use crate::cons::Cons;
use crate::error::{SerialError, SerialResult};
use crate::lexical::Lexical;
use crate::literal::{Boolean, Integer, Str};
use crate::object::ObjRef;

/// Constructor lookup for one family
pub type FamilyDecoder = fn(sid: u16) -> Option<ObjRef>;

/// Dispatch id of the core family
pub const CORE_FAMILY: u16 = 0x0001;

/// Sub-ids of the core family
pub mod core_sid {
    /// Cons cell
    pub const CONS: u16 = 0x0000;
    /// Integer literal
    pub const INTEGER: u16 = 0x0001;
    /// Boolean literal
    pub const BOOLEAN: u16 = 0x0002;
    /// String literal
    pub const STRING: u16 = 0x0003;
    /// Lexical symbol
    pub const LEXICAL: u16 = 0x0004;
}

static FAMILIES: LazyLock<RwLock<FxHashMap<u16, FamilyDecoder>>> = LazyLock::new(|| {
    let mut families = FxHashMap::default();
    families.insert(CORE_FAMILY, core_decoder as FamilyDecoder);
    tracing::debug!(target: "kestrel::serial", did = CORE_FAMILY, "core family registered");
    RwLock::new(families)
});

/// Register the decoder for family `did`.
///
/// The nil dispatch id is reserved, and a family can only be registered once.
pub fn register_family(did: u16, decoder: FamilyDecoder) -> SerialResult<()> {
    if did == NIL_DID {
        return Err(SerialError::ReservedFamily(did));
    }
    let mut families = FAMILIES.write();
    if families.contains_key(&did) {
        return Err(SerialError::FamilyRegistered(did));
    }
    families.insert(did, decoder);
    tracing::debug!(target: "kestrel::serial", did, "family registered");
    Ok(())
}

/// Whether family `did` has a decoder
pub fn is_registered(did: u16) -> bool {
    FAMILIES.read().contains_key(&did)
}

/// Decoder for family `did`
pub(crate) fn decoder(did: u16) -> Option<FamilyDecoder> {
    FAMILIES.read().get(&did).copied()
}

/// Decoder of the core family
pub fn core_decoder(sid: u16) -> Option<ObjRef> {
    let object = match sid {
        core_sid::CONS => ObjRef::from(Cons::empty()),
        core_sid::INTEGER => Integer::object(0),
        core_sid::BOOLEAN => Boolean::object(false),
        core_sid::STRING => Str::object(""),
        core_sid::LEXICAL => Lexical::object(""),
        _ => return None,
    };
    Some(object)
}

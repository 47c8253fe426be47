//! Typed binary serialization.
//!
//! Every serialized object starts with a 4-byte header: a `u16` dispatch id
//! (the family) and a `u16` sub-id (the concrete type inside the family),
//! both big-endian. The object's own state follows. Null is written as the
//! nil marker (dispatch id `0x0000`, sub-id `0xFFFF`), which also terminates
//! cons chains.
//!
//! Reading needs no knowledge of what comes next: the header selects a
//! registered family decoder, the decoder builds an empty instance, and the
//! instance reads its state.

pub mod registry;
pub mod wire;

use std::cell::Cell;
use std::io::Cursor;
use std::thread::LocalKey;

use crate::error::{SerialError, SerialResult, StreamOffset};
use crate::object::{ObjRef, Value};
use crate::stream::{InputStream, OutputStream};

pub use registry::{CORE_FAMILY, FamilyDecoder, core_sid, is_registered, register_family};

/// Dispatch id of the nil marker
pub const NIL_DID: u16 = 0x0000;

/// Sub-id of the nil marker; no family may use it
pub const NIL_SID: u16 = 0xFFFF;

/// Maximum nesting of objects written through [`serialize`] or read through
/// [`deserialize`]. Null counts as one level on both sides.
pub const MAX_SERIAL_DEPTH: usize = 256;

thread_local! {
    static READ_DEPTH: Cell<usize> = const { Cell::new(0) };
    static WRITE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Object header written before the state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SerialHeader {
    /// Family (dispatch id)
    pub did: u16,
    /// Concrete type within the family (sub-id)
    pub sid: u16,
}

impl SerialHeader {
    /// The nil marker
    pub const NIL: Self = Self {
        did: NIL_DID,
        sid: NIL_SID,
    };

    /// Create a header
    pub const fn new(did: u16, sid: u16) -> Self {
        Self { did, sid }
    }

    /// Whether this is the nil marker
    pub fn is_nil(self) -> bool {
        self == Self::NIL
    }

    /// Write the header
    pub fn write(self, out: &mut dyn OutputStream) -> SerialResult<()> {
        wire::write_u16(out, self.did)?;
        wire::write_u16(out, self.sid)
    }

    /// Read a header
    pub fn read(input: &mut dyn InputStream) -> SerialResult<Self> {
        let did = wire::read_u16(input)?;
        let sid = wire::read_u16(input)?;
        Ok(Self { did, sid })
    }
}

/// Types that can be written to and rebuilt from a stream.
///
/// `(serial_did, serial_sid)` must be unique per concrete type and stable
/// forever: persisted data depends on it.
pub trait Serial {
    /// Family id
    fn serial_did(&self) -> u16;

    /// Sub-id within the family
    fn serial_sid(&self) -> u16;

    /// Header for this object
    fn serial_header(&self) -> SerialHeader {
        SerialHeader::new(self.serial_did(), self.serial_sid())
    }

    /// Write the object's state (without header)
    fn write_state(&self, out: &mut dyn OutputStream) -> SerialResult<()>;

    /// Replace the object's state with one read from `input`
    fn read_state(&self, input: &mut dyn InputStream) -> SerialResult<()>;
}

/// Write a value: the nil marker for null, header and state otherwise
pub fn serialize(value: &Value, out: &mut dyn OutputStream) -> SerialResult<()> {
    match value {
        Some(object) => serialize_object(object, out),
        None => {
            let _depth = DepthGuard::enter(&WRITE_DEPTH)?;
            SerialHeader::NIL.write(out)
        }
    }
}

/// Write an object's header and state.
///
/// Fails with [`SerialError::TooDeep`] before writing anything that
/// [`deserialize`] would refuse to read back.
pub fn serialize_object(object: &ObjRef, out: &mut dyn OutputStream) -> SerialResult<()> {
    let _depth = DepthGuard::enter(&WRITE_DEPTH)?;
    let serial = object
        .as_serial()
        .ok_or(SerialError::NotSerializable(object.type_name()))?;
    serial.serial_header().write(out)?;
    serial.write_state(out)
}

/// One level of nesting on a per-thread counter, released on drop
struct DepthGuard {
    counter: &'static LocalKey<Cell<usize>>,
}

impl DepthGuard {
    fn enter(counter: &'static LocalKey<Cell<usize>>) -> SerialResult<Self> {
        counter.with(|depth| {
            if depth.get() >= MAX_SERIAL_DEPTH {
                return Err(SerialError::TooDeep(MAX_SERIAL_DEPTH));
            }
            depth.set(depth.get() + 1);
            Ok(DepthGuard { counter })
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        self.counter.with(|depth| depth.set(depth.get() - 1));
    }
}

/// Read the next value from `input`.
///
/// The returned object is owned by the caller alone.
pub fn deserialize(input: &mut dyn InputStream) -> SerialResult<Value> {
    let _depth = DepthGuard::enter(&READ_DEPTH)?;
    let at = StreamOffset(input.position());
    let header = SerialHeader::read(input)?;
    if header.is_nil() {
        return Ok(None);
    }
    let object = instantiate(header, at)?;
    let serial = object
        .as_serial()
        .ok_or(SerialError::NotSerializable(object.type_name()))?;
    serial.read_state(input)?;
    Ok(Some(object))
}

/// Build the empty instance named by `header`, checking that it reports the
/// same header back.
pub(crate) fn instantiate(header: SerialHeader, at: StreamOffset) -> SerialResult<ObjRef> {
    let decoder = registry::decoder(header.did).ok_or_else(|| {
        tracing::warn!(target: "kestrel::serial", did = header.did, offset = ?at.0, "unknown serial family");
        SerialError::UnknownFamily { did: header.did, at }
    })?;
    let object = decoder(header.sid).ok_or(SerialError::UnknownSubId {
        did: header.did,
        sid: header.sid,
        at,
    })?;
    let serial = object
        .as_serial()
        .ok_or(SerialError::NotSerializable(object.type_name()))?;
    let found = serial.serial_header();
    if found != header {
        return Err(SerialError::FamilyMismatch {
            did: header.did,
            sid: header.sid,
            found_did: found.did,
            found_sid: found.sid,
            type_name: object.type_name(),
            at,
        });
    }
    Ok(object)
}

/// Serialize a value into a new buffer
pub fn to_bytes(value: &Value) -> SerialResult<Vec<u8>> {
    let mut bytes = Vec::new();
    serialize(value, &mut bytes)?;
    Ok(bytes)
}

/// Deserialize exactly one value from `bytes`
pub fn from_bytes(bytes: &[u8]) -> SerialResult<Value> {
    let mut cursor = Cursor::new(bytes);
    let value = deserialize(&mut cursor)?;
    let consumed = cursor.position();
    if consumed != bytes.len() as u64 {
        return Err(SerialError::invalid_data(
            format!("{} trailing bytes", bytes.len() as u64 - consumed),
            StreamOffset(Some(consumed)),
        ));
    }
    Ok(value)
}

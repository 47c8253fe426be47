//! Serialization Integration Tests
//!
//! Round trips through the public protocol, including a family registered
//! from outside the crate.

use std::io::Cursor;
use std::sync::Once;

use kestrel_core::error::StreamOffset;
use kestrel_core::object::{repr_value, values_equal};
use kestrel_core::object_cell::ObjectCell;
use kestrel_core::serial::{self, SerialHeader, from_bytes, to_bytes, wire};
use kestrel_core::stream::Tracked;
use kestrel_core::{
    Boolean, Cons, ConsKind, InputStream, Integer, Lexical, ObjRef, Object, OutputStream, Serial,
    SerialError, SerialResult, Str, Value,
};

const GEOMETRY_FAMILY: u16 = 0x0010;
const POINT_SID: u16 = 0x0000;
const LABEL_SID: u16 = 0x0001;

#[derive(Default)]
struct Point {
    xy: ObjectCell<(i64, i64)>,
}

#[derive(Default)]
struct Label {
    text: ObjectCell<String>,
}

impl Object for Point {
    fn type_name(&self) -> &'static str {
        "Point"
    }

    fn repr(&self) -> String {
        let (x, y) = *self.xy.read();
        format!("<Point {x},{y}>")
    }

    fn equals(&self, other: &dyn Object) -> bool {
        other
            .as_any()
            .downcast_ref::<Point>()
            .is_some_and(|o| *o.xy.read() == *self.xy.read())
    }

    fn as_serial(&self) -> Option<&dyn Serial> {
        Some(self)
    }
}

impl Serial for Point {
    fn serial_did(&self) -> u16 {
        GEOMETRY_FAMILY
    }

    fn serial_sid(&self) -> u16 {
        POINT_SID
    }

    fn write_state(&self, out: &mut dyn OutputStream) -> SerialResult<()> {
        let (x, y) = *self.xy.read();
        wire::write_i64(out, x)?;
        wire::write_i64(out, y)
    }

    fn read_state(&self, input: &mut dyn InputStream) -> SerialResult<()> {
        let x = wire::read_i64(input)?;
        let y = wire::read_i64(input)?;
        *self.xy.write() = (x, y);
        Ok(())
    }
}

impl Object for Label {
    fn type_name(&self) -> &'static str {
        "Label"
    }

    fn repr(&self) -> String {
        format!("<Label {}>", *self.text.read())
    }

    fn equals(&self, other: &dyn Object) -> bool {
        other
            .as_any()
            .downcast_ref::<Label>()
            .is_some_and(|o| *o.text.read() == *self.text.read())
    }

    fn as_serial(&self) -> Option<&dyn Serial> {
        Some(self)
    }
}

impl Serial for Label {
    fn serial_did(&self) -> u16 {
        GEOMETRY_FAMILY
    }

    fn serial_sid(&self) -> u16 {
        LABEL_SID
    }

    fn write_state(&self, out: &mut dyn OutputStream) -> SerialResult<()> {
        wire::write_string(out, &self.text.read())
    }

    fn read_state(&self, input: &mut dyn InputStream) -> SerialResult<()> {
        let text = wire::read_string(input)?;
        *self.text.write() = text;
        Ok(())
    }
}

fn geometry_decoder(sid: u16) -> Option<ObjRef> {
    match sid {
        POINT_SID => Some(ObjRef::new(Point::default())),
        LABEL_SID => Some(ObjRef::new(Label::default())),
        _ => None,
    }
}

static REGISTER: Once = Once::new();

fn register_geometry() {
    REGISTER.call_once(|| {
        kestrel_core::register_family(GEOMETRY_FAMILY, geometry_decoder).unwrap();
    });
}

fn point(x: i64, y: i64) -> ObjRef {
    ObjRef::new(Point {
        xy: ObjectCell::new((x, y)),
    })
}

fn label(text: &str) -> ObjRef {
    ObjRef::new(Label {
        text: ObjectCell::new(text.to_string()),
    })
}

fn assert_round_trip(value: Value) {
    let bytes = to_bytes(&value).unwrap();
    let decoded = from_bytes(&bytes).unwrap();
    assert!(
        values_equal(&value, &decoded),
        "{} decoded as {}",
        repr_value(&value),
        repr_value(&decoded)
    );
    assert_eq!(to_bytes(&decoded).unwrap(), bytes, "re-encoding changed bytes");
    if let Some(object) = decoded {
        assert_eq!(object.ref_count(), 1);
    }
}

// ============================================================================
// Registered Family
// ============================================================================

#[test]
fn test_family_sub_ids_decode_to_right_type() {
    register_geometry();
    assert!(kestrel_core::serial::is_registered(GEOMETRY_FAMILY));

    let bytes = to_bytes(&Some(point(3, -4))).unwrap();
    assert_eq!(&bytes[..4], [0x00, 0x10, 0x00, 0x00]);
    let decoded = from_bytes(&bytes).unwrap().unwrap();
    assert_eq!(decoded.type_name(), "Point");
    assert_eq!(decoded.repr(), "<Point 3,-4>");

    let bytes = to_bytes(&Some(label("origin"))).unwrap();
    assert_eq!(&bytes[..4], [0x00, 0x10, 0x00, 0x01]);
    let decoded = from_bytes(&bytes).unwrap().unwrap();
    assert_eq!(decoded.type_name(), "Label");
    assert_eq!(decoded.repr(), "<Label origin>");
}

#[test]
fn test_family_registers_once() {
    register_geometry();
    assert!(matches!(
        kestrel_core::register_family(GEOMETRY_FAMILY, geometry_decoder),
        Err(SerialError::FamilyRegistered(GEOMETRY_FAMILY))
    ));
}

#[test]
fn test_unknown_sub_id_in_family() {
    register_geometry();
    let mut bytes = Vec::new();
    SerialHeader::new(GEOMETRY_FAMILY, 0x0002).write(&mut bytes).unwrap();
    assert!(matches!(
        from_bytes(&bytes),
        Err(SerialError::UnknownSubId { did: GEOMETRY_FAMILY, sid: 2, .. })
    ));
}

#[test]
fn test_foreign_objects_inside_lists() {
    register_geometry();
    let list = Cons::from_values([Some(point(1, 2)), Some(label("a")), None]);
    assert_round_trip(list.map(ObjRef::from));
}

// ============================================================================
// Core Family
// ============================================================================

#[test]
fn test_core_round_trips() {
    assert_round_trip(None);
    assert_round_trip(Some(Integer::object(i64::MIN)));
    assert_round_trip(Some(Boolean::object(true)));
    assert_round_trip(Some(Str::object("tab\there, ünïcode")));
    assert_round_trip(Some(Lexical::object("serial-it-symbol")));
    assert_round_trip(Some(Cons::empty().into()));

    let nested = Cons::list(
        ConsKind::Block,
        [
            Some(Integer::object(1)),
            Cons::from_values([Some(Str::object("x")), None]).map(ObjRef::from),
            Some(Boolean::object(false)),
        ],
    );
    assert_round_trip(nested.map(ObjRef::from));
}

#[test]
fn test_stream_of_values() {
    let mut out = Vec::new();
    serial::serialize(&Some(Integer::object(7)), &mut out).unwrap();
    serial::serialize(&None, &mut out).unwrap();
    serial::serialize(&Some(Str::object("end")), &mut out).unwrap();

    let mut input = Cursor::new(out);
    assert_eq!(repr_value(&serial::deserialize(&mut input).unwrap()), "7");
    assert!(serial::deserialize(&mut input).unwrap().is_none());
    assert_eq!(repr_value(&serial::deserialize(&mut input).unwrap()), "\"end\"");
    assert!(matches!(serial::deserialize(&mut input), Err(SerialError::Io(_))));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_unknown_family_offset_from_tracked_reader() {
    let mut bytes = to_bytes(&Some(Integer::object(1))).unwrap();
    bytes.extend_from_slice(&[0x7a, 0x01, 0x00, 0x00]);
    let mut input = Tracked::new(bytes.as_slice());
    serial::deserialize(&mut input).unwrap();
    let err = serial::deserialize(&mut input).unwrap_err();
    assert!(matches!(
        err,
        SerialError::UnknownFamily { did: 0x7a01, at: StreamOffset(Some(12)) }
    ));
}

#[test]
fn test_not_serializable() {
    let builtin = kestrel_core::Builtin::strict("serial-it-fn", |_, _, _| Ok(None));
    assert!(matches!(
        to_bytes(&Some(builtin)),
        Err(SerialError::NotSerializable("Builtin"))
    ));
}

#[test]
fn test_cdr_must_be_cons() {
    // A cons whose cdr slot holds an integer header instead of a cell
    let mut bytes = Vec::new();
    SerialHeader::new(serial::CORE_FAMILY, serial::core_sid::CONS)
        .write(&mut bytes)
        .unwrap();
    wire::write_u8(&mut bytes, 0).unwrap();
    serial::serialize(&Some(Integer::object(1)), &mut bytes).unwrap();
    serial::serialize(&Some(Integer::object(2)), &mut bytes).unwrap();
    assert!(matches!(
        from_bytes(&bytes),
        Err(SerialError::InvalidData { .. })
    ));
}

/// A value nested `levels` deep: an integer wrapped in `levels - 1` cars
fn nested(levels: usize) -> Value {
    let mut value: Value = Some(Integer::object(0));
    for _ in 1..levels {
        value = Some(Cons::new(value).into());
    }
    value
}

#[test]
fn test_nesting_limit() {
    let deepest = nested(serial::MAX_SERIAL_DEPTH);
    let bytes = to_bytes(&deepest).unwrap();
    assert!(values_equal(&from_bytes(&bytes).unwrap(), &deepest));

    assert!(matches!(
        to_bytes(&nested(serial::MAX_SERIAL_DEPTH + 1)),
        Err(SerialError::TooDeep(serial::MAX_SERIAL_DEPTH))
    ));
}

#[test]
fn test_nesting_limit_on_read() {
    // Hand-built stream one level deeper than any writer produces
    let mut bytes = Vec::new();
    let cons = SerialHeader::new(serial::CORE_FAMILY, serial::core_sid::CONS);
    for _ in 0..serial::MAX_SERIAL_DEPTH {
        cons.write(&mut bytes).unwrap();
        wire::write_u8(&mut bytes, 0).unwrap();
    }
    serial::serialize(&Some(Integer::object(0)), &mut bytes).unwrap();
    for _ in 0..serial::MAX_SERIAL_DEPTH {
        SerialHeader::NIL.write(&mut bytes).unwrap();
    }
    assert!(matches!(
        from_bytes(&bytes),
        Err(SerialError::TooDeep(serial::MAX_SERIAL_DEPTH))
    ));
}

#[test]
fn test_very_deep_write_fails_cleanly() {
    let value = nested(200_000);
    assert!(matches!(
        to_bytes(&value),
        Err(SerialError::TooDeep(serial::MAX_SERIAL_DEPTH))
    ));
    // Depth counter is back at zero after the failure
    assert!(to_bytes(&nested(serial::MAX_SERIAL_DEPTH)).is_ok());
}

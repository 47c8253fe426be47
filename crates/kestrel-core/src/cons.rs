//! Cons cells: the pair node code and data are built from.
//!
//! A cell holds a `car` (any value) and a `cdr` (another cell or null). A
//! chain of cells ending in null is a proper list. Cells tagged
//! [`ConsKind::Block`] are statement sequences: evaluating one evaluates each
//! element in order.
//!
//! Chains may be made cyclic through `set_cdr`. Traversals that must finish
//! (`length`, `repr`, `to_vec`, serialization) detect cycles with Brent's
//! algorithm; [`Cons::iter`] does not and runs forever on a cyclic chain.
//! A `car` may also lead back to a cell being printed or compared: `repr`
//! prints `...` at that point and `equals` treats the pair as equal.
//! Reference counting cannot reclaim a cycle.

use std::cell::RefCell;
use std::sync::{Arc, LazyLock, OnceLock};

use parking_lot::ReentrantMutex;
use rustc_hash::FxHashSet;

use crate::dispatch::{Arity, MethodTable};
use crate::drop_guard::DropGuard;
use crate::error::{CoreError, CoreResult, SerialError, SerialResult, StreamOffset};
use crate::evaluator::Evaluator;
use crate::literal::{Boolean, Integer};
use crate::nameset::Nameset;
use crate::object::{OBJECT_METHODS, ObjRef, Object, Value, repr_value, values_equal};
use crate::object_cell::ObjectCell;
use crate::serial::{self, CORE_FAMILY, Serial, SerialHeader, core_sid, wire};
use crate::stream::{InputStream, OutputStream};

/// Cell tag
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConsKind {
    /// Ordinary pair; evaluates as an application
    #[default]
    Normal,
    /// Statement sequence; evaluates each element in order
    Block,
}

impl ConsKind {
    fn to_byte(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Block => 1,
        }
    }

    fn from_byte(byte: u8, at: StreamOffset) -> SerialResult<Self> {
        match byte {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Block),
            other => Err(SerialError::invalid_data(
                format!("invalid cons kind 0x{other:02x}"),
                at,
            )),
        }
    }
}

#[derive(Debug, Default)]
struct ConsState {
    kind: ConsKind,
    car: Value,
    cdr: Option<Arc<Cons>>,
}

/// Pair cell
pub struct Cons {
    state: ObjectCell<ConsState>,
    monitor: OnceLock<ReentrantMutex<()>>,
}

/// Position in a chain: the cell a traversal started from, or a cell reached
/// through a `cdr`
enum Link<'a> {
    Head(&'a Cons),
    Cell(Arc<Cons>),
}

impl<'a> Link<'a> {
    fn get(&self) -> &Cons {
        match self {
            Self::Head(cell) => cell,
            Self::Cell(cell) => cell,
        }
    }

    fn next(&self) -> Option<Link<'a>> {
        self.get().cdr().map(Link::Cell)
    }

    fn is(&self, other: &Link<'_>) -> bool {
        std::ptr::eq(self.get(), other.get())
    }

    fn clone_link(&self) -> Link<'a> {
        match self {
            Self::Head(cell) => Self::Head(cell),
            Self::Cell(cell) => Self::Cell(cell.clone()),
        }
    }
}

/// Shape of a chain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Extent {
    /// Distinct cells reachable through `cdr`, the head included
    cells: usize,
    cyclic: bool,
}

impl Cons {
    fn with_state(kind: ConsKind, car: Value, cdr: Option<Arc<Cons>>) -> Arc<Self> {
        Arc::new(Self {
            state: ObjectCell::new(ConsState { kind, car, cdr }),
            monitor: OnceLock::new(),
        })
    }

    /// Empty normal cell: null car, null cdr
    pub fn empty() -> Arc<Self> {
        Self::with_state(ConsKind::Normal, None, None)
    }

    /// Normal cell holding `car`
    pub fn new(car: Value) -> Arc<Self> {
        Self::with_state(ConsKind::Normal, car, None)
    }

    /// Block cell holding `car`
    pub fn block(car: Value) -> Arc<Self> {
        Self::with_state(ConsKind::Block, car, None)
    }

    /// Normal cell linked to `cdr`
    pub fn pair(car: Value, cdr: Option<Arc<Cons>>) -> Arc<Self> {
        Self::with_state(ConsKind::Normal, car, cdr)
    }

    /// Proper list of `kind` cells, `None` when `values` is empty
    pub fn list(kind: ConsKind, values: impl IntoIterator<Item = Value>) -> Option<Arc<Self>> {
        let values: Vec<Value> = values.into_iter().collect();
        values
            .into_iter()
            .rev()
            .fold(None, |cdr, car| Some(Self::with_state(kind, car, cdr)))
    }

    /// Proper list of normal cells, `None` when `values` is empty
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Option<Arc<Self>> {
        Self::list(ConsKind::Normal, values)
    }

    /// Cell tag
    pub fn kind(&self) -> ConsKind {
        self.state.read().kind
    }

    /// Whether this is a block cell
    pub fn is_block(&self) -> bool {
        self.kind() == ConsKind::Block
    }

    /// Whether both slots are null
    pub fn is_nil(&self) -> bool {
        let state = self.state.read();
        state.car.is_none() && state.cdr.is_none()
    }

    /// First slot
    pub fn car(&self) -> Value {
        self.state.read().car.clone()
    }

    /// Second slot
    pub fn cdr(&self) -> Option<Arc<Cons>> {
        self.state.read().cdr.clone()
    }

    /// `car` of the `cdr`
    pub fn cadr(&self) -> Value {
        self.nth(1)
    }

    /// `car` of the `cddr`
    pub fn caddr(&self) -> Value {
        self.nth(2)
    }

    /// `car` of the `cdddr`
    pub fn cadddr(&self) -> Value {
        self.nth(3)
    }

    /// `cdr` of the `cdr`
    pub fn cddr(&self) -> Option<Arc<Cons>> {
        self.cdr().and_then(|c| c.cdr())
    }

    /// `cdr` of the `cddr`
    pub fn cdddr(&self) -> Option<Arc<Cons>> {
        self.cddr().and_then(|c| c.cdr())
    }

    fn link_at(&self, index: usize) -> Option<Link<'_>> {
        let mut link = Link::Head(self);
        for _ in 0..index {
            link = link.next()?;
        }
        Some(link)
    }

    /// `car` of cell `index`; null past the end
    pub fn nth(&self, index: usize) -> Value {
        self.link_at(index).and_then(|link| link.get().car())
    }

    /// Cell `index`; null past the end
    pub fn nth_cdr(self: &Arc<Self>, index: usize) -> Option<Arc<Cons>> {
        match index {
            0 => Some(self.clone()),
            n => self.link_at(n).map(|link| match link {
                Link::Head(_) => self.clone(),
                Link::Cell(cell) => cell,
            }),
        }
    }

    /// `car` of cell `index`, failing past the end.
    ///
    /// Returns the element, not the cell holding it; use [`Cons::nth_cdr`]
    /// for the cell itself.
    pub fn get(&self, index: usize) -> CoreResult<Value> {
        match self.link_at(index) {
            Some(link) => Ok(link.get().car()),
            None => Err(CoreError::IndexOutOfRange {
                index,
                length: self.length(),
            }),
        }
    }

    /// Replace the first slot
    pub fn set_car(&self, car: Value) {
        let old = std::mem::replace(&mut self.state.write().car, car);
        drop(old);
    }

    /// Replace the second slot
    pub fn set_cdr(&self, cdr: Option<Arc<Cons>>) {
        let old = std::mem::replace(&mut self.state.write().cdr, cdr);
        drop(old);
    }

    /// Replace the second slot with an arbitrary value, which must be a cell
    /// or null
    pub fn set_cdr_value(&self, cdr: Value) -> CoreResult<()> {
        let cdr = match cdr {
            None => None,
            Some(object) => Some(object.downcast::<Cons>().ok_or_else(|| {
                CoreError::cons_type(format!(
                    "cdr must be a cons cell or nil, got {}",
                    object.type_name()
                ))
            })?),
        };
        self.set_cdr(cdr);
        Ok(())
    }

    /// Append a cell holding `value` at the tail; the new cell has the head's
    /// kind
    pub fn add(&self, value: Value) -> CoreResult<()> {
        if self.is_cyclic() {
            return Err(CoreError::CyclicList);
        }
        let mut tail = Link::Head(self);
        while let Some(next) = tail.next() {
            tail = next;
        }
        tail.get().set_cdr(Some(Self::with_state(self.kind(), value, None)));
        Ok(())
    }

    /// Attach the evaluation monitor, if not already present
    pub fn make_synchronized(&self) {
        self.monitor.get_or_init(|| ReentrantMutex::new(()));
    }

    /// Whether evaluation of this cell is serialized by a monitor
    pub fn is_synchronized(&self) -> bool {
        self.monitor.get().is_some()
    }

    /// Evaluation monitor, when attached
    pub fn monitor(&self) -> Option<&ReentrantMutex<()>> {
        self.monitor.get()
    }

    // Brent's cycle detection over the cdr chain
    fn extent(&self) -> Extent {
        let mut power = 1usize;
        let mut lambda = 1usize;
        let mut tortoise = Link::Head(self);
        let mut hare = tortoise.next();
        let mut visited = 1usize;
        loop {
            let Some(current) = hare else {
                return Extent {
                    cells: visited,
                    cyclic: false,
                };
            };
            if current.is(&tortoise) {
                break;
            }
            if power == lambda {
                tortoise = current.clone_link();
                power *= 2;
                lambda = 0;
            }
            hare = current.next();
            lambda += 1;
            visited += 1;
        }

        // Cycle of length lambda; find where it starts
        let mut tortoise = Link::Head(self);
        let mut hare = Link::Head(self);
        for _ in 0..lambda {
            match hare.next() {
                Some(next) => hare = next,
                None => break,
            }
        }
        let mut mu = 0usize;
        while !tortoise.is(&hare) {
            match (tortoise.next(), hare.next()) {
                (Some(t), Some(h)) => {
                    tortoise = t;
                    hare = h;
                }
                _ => break,
            }
            mu += 1;
        }
        Extent {
            cells: mu + lambda,
            cyclic: true,
        }
    }

    /// Number of distinct cells in the chain, this one included. Terminates
    /// on cyclic chains.
    pub fn length(&self) -> usize {
        self.extent().cells
    }

    /// Whether the chain loops back on itself
    pub fn is_cyclic(&self) -> bool {
        self.extent().cyclic
    }

    /// `car` of each cell, following `cdr` until null.
    ///
    /// Never ends on a cyclic chain; use [`Cons::to_vec`] when the chain is
    /// untrusted.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: Some(Link::Head(self)),
        }
    }

    /// `car` of each distinct cell
    pub fn to_vec(&self) -> Vec<Value> {
        self.iter().take(self.length()).collect()
    }

    /// Empty both slots. Used by the drop guard on cells it owns outright.
    pub(crate) fn take_slots(&mut self) -> (Value, Option<Arc<Cons>>) {
        let state = self.state.get_mut();
        (state.car.take(), state.cdr.take())
    }

    fn receiver(this: &ObjRef) -> CoreResult<&Cons> {
        this.downcast_ref::<Cons>()
            .ok_or_else(|| CoreError::type_error(format!("expected Cons, got {}", this.type_name())))
    }
}

impl Drop for Cons {
    fn drop(&mut self) {
        let (car, cdr) = self.take_slots();
        if car.is_none() && cdr.is_none() {
            return;
        }
        let mut guard = DropGuard::new();
        guard.push_value(car);
        guard.push_cell(cdr);
        guard.run();
    }
}

impl std::fmt::Debug for Cons {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cons")
            .field("kind", &self.kind())
            .field("repr", &self.repr())
            .field("synchronized", &self.is_synchronized())
            .finish()
    }
}

/// Iterator over the cars of a chain
pub struct Iter<'a> {
    next: Option<Link<'a>>,
}

impl Iterator for Iter<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let link = self.next.take()?;
        let car = link.get().car();
        self.next = link.next();
        Some(car)
    }
}

thread_local! {
    /// Cells (or pairs of cells) whose `repr`/`equals` is running on this thread
    static VISITING: RefCell<FxHashSet<(usize, usize)>> = RefCell::new(FxHashSet::default());
}

/// Entry in [`VISITING`], removed on drop
struct Visit {
    key: (usize, usize),
}

impl Visit {
    /// `None` when `key` is already being visited
    fn enter(key: (usize, usize)) -> Option<Self> {
        VISITING
            .with(|visiting| visiting.borrow_mut().insert(key))
            .then(|| Visit { key })
    }
}

impl Drop for Visit {
    fn drop(&mut self) {
        VISITING.with(|visiting| {
            visiting.borrow_mut().remove(&self.key);
        });
    }
}

fn cell_addr(cell: &Cons) -> usize {
    cell as *const Cons as usize
}

// ============================================================================
// Dispatch
// ============================================================================

static CONS_METHODS: LazyLock<MethodTable> = LazyLock::new(|| {
    MethodTable::builder("Cons")
        .parent(&OBJECT_METHODS)
        .method("get-car", Arity::Exact(0), cons_get_car)
        .method("get-cdr", Arity::Exact(0), cons_get_cdr)
        .method("get-cadr", Arity::Exact(0), cons_get_cadr)
        .method("get-caddr", Arity::Exact(0), cons_get_caddr)
        .method("set-car", Arity::Exact(1), cons_set_car)
        .method("set-cdr", Arity::Exact(1), cons_set_cdr)
        .method("add", Arity::Exact(1), cons_add)
        .method("length", Arity::Exact(0), cons_length)
        .method("nil-p", Arity::Exact(0), cons_nil_p)
        .method("block-p", Arity::Exact(0), cons_block_p)
        .method("get", Arity::Exact(1), cons_get)
        .method("nth", Arity::Exact(1), cons_nth)
        .build()
});

fn index_arg(value: &Value) -> CoreResult<usize> {
    let n = Integer::from_value(value)?;
    usize::try_from(n).map_err(|_| CoreError::type_error(format!("index must be non-negative, got {n}")))
}

fn cell_value(cell: Option<Arc<Cons>>) -> Value {
    cell.map(ObjRef::from)
}

fn cons_get_car(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    Ok(Cons::receiver(this)?.car())
}

fn cons_get_cdr(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    Ok(cell_value(Cons::receiver(this)?.cdr()))
}

fn cons_get_cadr(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    Ok(Cons::receiver(this)?.cadr())
}

fn cons_get_caddr(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    Ok(Cons::receiver(this)?.caddr())
}

fn cons_set_car(this: &ObjRef, _: &Evaluator, _: &Nameset, argv: &[Value]) -> CoreResult<Value> {
    Cons::receiver(this)?.set_car(argv[0].clone());
    Ok(Some(this.clone()))
}

fn cons_set_cdr(this: &ObjRef, _: &Evaluator, _: &Nameset, argv: &[Value]) -> CoreResult<Value> {
    Cons::receiver(this)?.set_cdr_value(argv[0].clone())?;
    Ok(Some(this.clone()))
}

fn cons_add(this: &ObjRef, _: &Evaluator, _: &Nameset, argv: &[Value]) -> CoreResult<Value> {
    Cons::receiver(this)?.add(argv[0].clone())?;
    Ok(Some(this.clone()))
}

fn cons_length(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    let length = Cons::receiver(this)?.length();
    Ok(Some(Integer::object(length as i64)))
}

fn cons_nil_p(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    Ok(Some(Boolean::object(Cons::receiver(this)?.is_nil())))
}

fn cons_block_p(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    Ok(Some(Boolean::object(Cons::receiver(this)?.is_block())))
}

fn cons_get(this: &ObjRef, _: &Evaluator, _: &Nameset, argv: &[Value]) -> CoreResult<Value> {
    Cons::receiver(this)?.get(index_arg(&argv[0])?)
}

fn cons_nth(this: &ObjRef, _: &Evaluator, _: &Nameset, argv: &[Value]) -> CoreResult<Value> {
    Ok(Cons::receiver(this)?.nth(index_arg(&argv[0])?))
}

impl Object for Cons {
    fn type_name(&self) -> &'static str {
        "Cons"
    }

    fn method_table(&self) -> &'static MethodTable {
        &CONS_METHODS
    }

    fn repr(&self) -> String {
        let Some(_visit) = Visit::enter((cell_addr(self), 0)) else {
            return "...".to_string();
        };
        let extent = self.extent();
        let (open, close) = match self.kind() {
            ConsKind::Normal => ('(', ')'),
            ConsKind::Block => ('{', '}'),
        };
        let mut out = String::new();
        out.push(open);
        for (i, car) in self.iter().take(extent.cells).enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&repr_value(&car));
        }
        if extent.cyclic {
            out.push_str(" ...");
        }
        out.push(close);
        out
    }

    /// Copies the spine; cars are shared with the original.
    fn clone_object(&self) -> CoreResult<ObjRef> {
        if self.is_cyclic() {
            return Err(CoreError::CyclicList);
        }
        let copy = Cons::list(self.kind(), self.iter()).unwrap_or_else(Cons::empty);
        Ok(copy.into())
    }

    fn equals(&self, other: &dyn Object) -> bool {
        let Some(other) = other.as_any().downcast_ref::<Cons>() else {
            return false;
        };
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.kind() != other.kind() {
            return false;
        }
        let Some(_visit) = Visit::enter((cell_addr(self), cell_addr(other))) else {
            return true;
        };
        let (mine, theirs) = (self.extent(), other.extent());
        if mine != theirs {
            return false;
        }
        self.iter()
            .zip(other.iter())
            .take(mine.cells)
            .all(|(a, b)| values_equal(&a, &b))
    }

    fn eval(&self, _this: &ObjRef, ev: &Evaluator, ns: &Nameset) -> CoreResult<Value> {
        ev.eval_cons(self, ns)
    }

    fn as_serial(&self) -> Option<&dyn Serial> {
        Some(self)
    }
}

// ============================================================================
// Serialization
// ============================================================================

const CONS_HEADER: SerialHeader = SerialHeader::new(CORE_FAMILY, core_sid::CONS);

impl Cons {
    fn write_cell(&self, out: &mut dyn OutputStream) -> SerialResult<()> {
        wire::write_u8(out, self.kind().to_byte())?;
        serial::serialize(&self.car(), out)
    }

    fn read_cell(&self, input: &mut dyn InputStream) -> SerialResult<()> {
        let at = StreamOffset(input.position());
        let kind = ConsKind::from_byte(wire::read_u8(input)?, at)?;
        let car = serial::deserialize(input)?;
        let mut state = self.state.write();
        state.kind = kind;
        state.car = car;
        Ok(())
    }
}

impl Serial for Cons {
    fn serial_did(&self) -> u16 {
        CORE_FAMILY
    }

    fn serial_sid(&self) -> u16 {
        core_sid::CONS
    }

    fn write_state(&self, out: &mut dyn OutputStream) -> SerialResult<()> {
        let extent = self.extent();
        if extent.cyclic {
            return Err(SerialError::invalid_data(
                "cannot serialize a cyclic list",
                StreamOffset::default(),
            ));
        }
        self.write_cell(out)?;
        let mut link = Link::Head(self).next();
        while let Some(cell) = link {
            CONS_HEADER.write(out)?;
            cell.get().write_cell(out)?;
            link = cell.next();
        }
        SerialHeader::NIL.write(out)
    }

    fn read_state(&self, input: &mut dyn InputStream) -> SerialResult<()> {
        self.read_cell(input)?;
        let mut tail: Option<Arc<Cons>> = None;
        loop {
            let at = StreamOffset(input.position());
            let header = SerialHeader::read(input)?;
            if header.is_nil() {
                break;
            }
            if header != CONS_HEADER {
                return Err(SerialError::invalid_data(
                    format!(
                        "cdr must be a cons cell, found header 0x{:04x}/0x{:04x}",
                        header.did, header.sid
                    ),
                    at,
                ));
            }
            let cell = Cons::empty();
            cell.read_cell(input)?;
            match &tail {
                Some(prev) => prev.set_cdr(Some(cell.clone())),
                None => self.set_cdr(Some(cell.clone())),
            }
            tail = Some(cell);
        }
        if tail.is_none() {
            self.set_cdr(None);
        }
        Ok(())
    }
}

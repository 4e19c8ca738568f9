//! Root visitors and the handle types they receive.
//!
//! Roots are owned by the runtime; the root processor only decides which visitor sees
//! which root category. Every closure trait is implemented for plain closures, so a
//! caller can pass `&mut |slot: &mut ObjectReference| { ... }` directly.

use std::fmt;

use crate::error::VisitResult;

/// Address of a heap object held in a root slot. [`ObjectReference::NULL`] marks an
/// empty or cleared slot.
#[repr(transparent)]
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ObjectReference(usize);

impl ObjectReference {
    pub const NULL: Self = Self(0);

    pub const fn from_raw_address(addr: usize) -> Self {
        Self(addr)
    }

    pub const fn to_raw_address(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Class loader data as handed out by the class loader data graph. `holder` is the
/// loader object keeping it alive.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ClassLoaderData {
    pub id: usize,
    pub holder: ObjectReference,
}

/// Compiled method with embedded object references.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct CodeBlob {
    pub id: usize,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct JavaThread {
    pub id: usize,
}

pub trait OopClosure {
    /// Visits one root slot. The closure may update the slot in place.
    fn do_oop(&mut self, slot: &mut ObjectReference) -> VisitResult;
}

pub trait CldClosure {
    fn do_cld(&mut self, cld: ClassLoaderData) -> VisitResult;
}

pub trait CodeBlobClosure {
    fn do_code_blob(&mut self, blob: CodeBlob) -> VisitResult;
}

pub trait ThreadClosure {
    fn do_thread(&mut self, thread: JavaThread) -> VisitResult;
}

/// Liveness predicate used to filter weak roots.
pub trait IsAliveClosure {
    fn do_object_b(&self, object: ObjectReference) -> bool;
}

impl<F> OopClosure for F
where
    F: FnMut(&mut ObjectReference) -> VisitResult,
{
    fn do_oop(&mut self, slot: &mut ObjectReference) -> VisitResult {
        self(slot)
    }
}

impl<F> CldClosure for F
where
    F: FnMut(ClassLoaderData) -> VisitResult,
{
    fn do_cld(&mut self, cld: ClassLoaderData) -> VisitResult {
        self(cld)
    }
}

impl<F> CodeBlobClosure for F
where
    F: FnMut(CodeBlob) -> VisitResult,
{
    fn do_code_blob(&mut self, blob: CodeBlob) -> VisitResult {
        self(blob)
    }
}

impl<F> ThreadClosure for F
where
    F: FnMut(JavaThread) -> VisitResult,
{
    fn do_thread(&mut self, thread: JavaThread) -> VisitResult {
        self(thread)
    }
}

impl<F> IsAliveClosure for F
where
    F: Fn(ObjectReference) -> bool,
{
    fn do_object_b(&self, object: ObjectReference) -> bool {
        self(object)
    }
}

/// Treats every non-null object as live.
pub struct AlwaysTrueClosure;

impl IsAliveClosure for AlwaysTrueClosure {
    fn do_object_b(&self, object: ObjectReference) -> bool {
        !object.is_null()
    }
}

/// Wraps a weak-root visitor: dead referents are cleared and never reach the inner
/// closure, live ones are passed through for update.
pub struct IsAliveFilter<'a, A: ?Sized> {
    is_alive: &'a A,
    inner: &'a mut dyn OopClosure,
}

impl<'a, A: IsAliveClosure + ?Sized> IsAliveFilter<'a, A> {
    pub fn new(is_alive: &'a A, inner: &'a mut dyn OopClosure) -> Self {
        Self { is_alive, inner }
    }
}

impl<A: IsAliveClosure + ?Sized> OopClosure for IsAliveFilter<'_, A> {
    fn do_oop(&mut self, slot: &mut ObjectReference) -> VisitResult {
        if slot.is_null() {
            return Ok(());
        }
        if self.is_alive.do_object_b(*slot) {
            self.inner.do_oop(slot)
        } else {
            *slot = ObjectReference::NULL;
            Ok(())
        }
    }
}

/// Applies the CLD closure only to class loader data whose holder is still live.
pub struct LiveCldFilter<'a, A: ?Sized> {
    is_alive: &'a A,
    inner: &'a mut dyn CldClosure,
}

impl<'a, A: IsAliveClosure + ?Sized> LiveCldFilter<'a, A> {
    pub fn new(is_alive: &'a A, inner: &'a mut dyn CldClosure) -> Self {
        Self { is_alive, inner }
    }
}

impl<A: IsAliveClosure + ?Sized> CldClosure for LiveCldFilter<'_, A> {
    fn do_cld(&mut self, cld: ClassLoaderData) -> VisitResult {
        if self.is_alive.do_object_b(cld.holder) {
            self.inner.do_cld(cld)
        } else {
            Ok(())
        }
    }
}

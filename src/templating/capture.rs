//! Captured values and the two-closure capture context.
//!
//! A template is compiled as a method of a closure object (the *template* closure). It is
//! produced by a callback that is itself usually a closure (the *callback* closure). Fields
//! and property getters of both objects are what the template can observe at expansion time.
//!
//! The [`CaptureContext`] holds both closures and the member sets used to decide which
//! closure owns a field or getter. Membership is computed once when the context is built; the
//! values themselves are read on demand by the expander and memoized per pass.

use std::{any::Any, fmt, sync::Arc};

use rustc_hash::FxHashSet;
use strum::Display;

use crate::{
    assembly::Local,
    metadata::{CilTypeRc, Field, FieldRc, Method, MethodRc, PropertyRc},
    Error, Result,
};

/// The member a placeholder operation acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberDescriptor {
    /// A field of the destination type (or any static field)
    Field(FieldRc),
    /// A property, accessed through its getter / setter
    Property(PropertyRc),
    /// A local variable of the destination method
    Local(Local),
    /// A method to invoke
    Method(MethodRc),
}

impl MemberDescriptor {
    /// Returns `true` if accessing the member needs the destination's receiver on the stack.
    #[must_use]
    pub fn needs_receiver(&self) -> bool {
        match self {
            MemberDescriptor::Field(field) => !field.is_static(),
            MemberDescriptor::Property(property) => !property.is_static(),
            MemberDescriptor::Local(_) => false,
            MemberDescriptor::Method(method) => !method.is_static(),
        }
    }
}

impl fmt::Display for MemberDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberDescriptor::Field(field) => write!(f, "field {field}"),
            MemberDescriptor::Property(property) => write!(f, "property {property}"),
            MemberDescriptor::Local(local) => write!(f, "local {local}"),
            MemberDescriptor::Method(method) => write!(f, "method {method}"),
        }
    }
}

/// An arbitrary captured object together with its type identity.
///
/// Objects have no immediate-operand representation. The expander parks them in a
/// [`crate::templating::CaptureTable`] and emits a call to a generated accessor instead.
#[derive(Clone)]
pub struct CapturedObject {
    object_type: CilTypeRc,
    value: Arc<dyn Any + Send + Sync>,
}

impl CapturedObject {
    /// Wrap a value of the given type.
    pub fn new<T: Any + Send + Sync>(object_type: CilTypeRc, value: T) -> Self {
        CapturedObject {
            object_type,
            value: Arc::new(value),
        }
    }

    /// Wrap an already shared value.
    #[must_use]
    pub fn from_shared(object_type: CilTypeRc, value: Arc<dyn Any + Send + Sync>) -> Self {
        CapturedObject { object_type, value }
    }

    /// The type the generated accessor casts the object to.
    #[must_use]
    pub fn object_type(&self) -> &CilTypeRc {
        &self.object_type
    }

    /// Borrow the value if it has type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns `true` if both handles share the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &CapturedObject) -> bool {
        std::ptr::eq(self.address(), other.address())
    }

    pub(crate) fn address(&self) -> *const u8 {
        Arc::as_ptr(&self.value).cast::<u8>()
    }
}

impl PartialEq for CapturedObject {
    fn eq(&self, other: &Self) -> bool {
        self.object_type == other.object_type && self.ptr_eq(other)
    }
}

impl fmt::Debug for CapturedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapturedObject({} @ {:p})", self.object_type, self.address())
    }
}

/// A value read from a closure at expansion time.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedValue {
    /// A null reference
    Null,
    /// `bool`
    Bool(bool),
    /// `char`, as UTF-16 code unit
    Char(u16),
    /// `sbyte`
    I8(i8),
    /// `byte`
    U8(u8),
    /// `short`
    I16(i16),
    /// `ushort`
    U16(u16),
    /// `int`
    I32(i32),
    /// `uint`
    U32(u32),
    /// `long`
    I64(i64),
    /// `ulong`
    U64(u64),
    /// `float`
    F32(f32),
    /// `double`
    F64(f64),
    /// `string`
    String(String),
    /// A member descriptor, only meaningful as a placeholder argument
    Member(MemberDescriptor),
    /// A delegate, identified by the method it is bound to
    Delegate(MethodRc),
    /// Any other object
    Object(CapturedObject),
}

impl fmt::Display for CapturedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapturedValue::Null => f.write_str("null"),
            CapturedValue::Bool(v) => write!(f, "{v}"),
            CapturedValue::Char(v) => write!(f, "'\\u{v:04x}'"),
            CapturedValue::I8(v) => write!(f, "{v}"),
            CapturedValue::U8(v) => write!(f, "{v}"),
            CapturedValue::I16(v) => write!(f, "{v}"),
            CapturedValue::U16(v) => write!(f, "{v}"),
            CapturedValue::I32(v) => write!(f, "{v}"),
            CapturedValue::U32(v) => write!(f, "{v}"),
            CapturedValue::I64(v) => write!(f, "{v}"),
            CapturedValue::U64(v) => write!(f, "{v}"),
            CapturedValue::F32(v) => write!(f, "{v}"),
            CapturedValue::F64(v) => write!(f, "{v}"),
            CapturedValue::String(v) => write!(f, "{v:?}"),
            CapturedValue::Member(member) => write!(f, "{member}"),
            CapturedValue::Delegate(method) => write!(f, "delegate {method}"),
            CapturedValue::Object(object) => write!(f, "{object:?}"),
        }
    }
}

/// Which of the two closures owns a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ClosureKind {
    /// The object the template method is compiled on
    Template,
    /// The object the template-producing callback is compiled on
    Callback,
}

/// A closure object whose captured state can be inspected.
pub trait ClosureObject: Send + Sync {
    /// The compiler generated type of the closure.
    fn captured_type(&self) -> CilTypeRc;

    /// Every field of the closure.
    fn fields(&self) -> Vec<FieldRc>;

    /// Every instance property getter of the closure.
    fn getters(&self) -> Vec<MethodRc>;

    /// Read the current value of a field.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvableCapture`] if the field does not belong to this
    /// closure or its value can not be represented.
    fn read_field(&self, field: &Field) -> Result<CapturedValue>;

    /// Invoke a property getter.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvableCapture`] if the getter does not belong to this
    /// closure or its value can not be represented.
    fn read_getter(&self, getter: &Method) -> Result<CapturedValue>;
}

/// A [`ClosureObject`] holding its captured state as a snapshot of values.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use dotemit::{
///     metadata::{CilType, Field, FieldAttributes, Token},
///     templating::{CapturedValue, Closure, ClosureObject},
/// };
///
/// let closure_type = Arc::new(CilType::new(Token::new(0x0200_0010), "", "<>c__DisplayClass0_0", "Demo"));
/// let int32 = Arc::new(CilType::new(Token::new(0x0100_0008), "System", "Int32", "System.Runtime"));
/// let count = Arc::new(Field {
///     token: Token::new(0x0400_0001),
///     name: "count".to_string(),
///     declaring_type: closure_type.clone(),
///     field_type: int32,
///     flags: FieldAttributes::PUBLIC,
/// });
///
/// let closure = Closure::new(closure_type).with_field(count.clone(), CapturedValue::I32(7));
/// assert_eq!(closure.read_field(&count)?, CapturedValue::I32(7));
/// # Ok::<(), dotemit::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Closure {
    captured_type: CilTypeRc,
    fields: Vec<(FieldRc, CapturedValue)>,
    getters: Vec<(MethodRc, CapturedValue)>,
}

impl Closure {
    /// Create a closure of the given type without captured state.
    #[must_use]
    pub fn new(captured_type: CilTypeRc) -> Self {
        Closure {
            captured_type,
            fields: Vec::new(),
            getters: Vec::new(),
        }
    }

    /// Add a captured field.
    #[must_use]
    pub fn with_field(mut self, field: FieldRc, value: CapturedValue) -> Self {
        self.fields.push((field, value));
        self
    }

    /// Add a property getter returning a fixed value.
    #[must_use]
    pub fn with_getter(mut self, getter: MethodRc, value: CapturedValue) -> Self {
        self.getters.push((getter, value));
        self
    }
}

impl ClosureObject for Closure {
    fn captured_type(&self) -> CilTypeRc {
        self.captured_type.clone()
    }

    fn fields(&self) -> Vec<FieldRc> {
        self.fields.iter().map(|(field, _)| field.clone()).collect()
    }

    fn getters(&self) -> Vec<MethodRc> {
        self.getters.iter().map(|(getter, _)| getter.clone()).collect()
    }

    fn read_field(&self, field: &Field) -> Result<CapturedValue> {
        self.fields
            .iter()
            .find(|(candidate, _)| **candidate == *field)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| {
                Error::UnresolvableCapture(format!(
                    "{} has no field {}",
                    self.captured_type, field
                ))
            })
    }

    fn read_getter(&self, getter: &Method) -> Result<CapturedValue> {
        self.getters
            .iter()
            .find(|(candidate, _)| **candidate == *getter)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| {
                Error::UnresolvableCapture(format!(
                    "{} has no getter {}",
                    self.captured_type, getter
                ))
            })
    }
}

#[derive(Debug, Clone, Default)]
struct MemberSet {
    fields: FxHashSet<FieldRc>,
    getters: FxHashSet<MethodRc>,
}

impl MemberSet {
    fn of(closure: Option<&Arc<dyn ClosureObject>>) -> Self {
        closure.map_or_else(MemberSet::default, |closure| MemberSet {
            fields: closure.fields().into_iter().collect(),
            getters: closure.getters().into_iter().collect(),
        })
    }
}

/// The closures a template can observe, with their member sets.
#[derive(Clone, Default)]
pub struct CaptureContext {
    template: Option<Arc<dyn ClosureObject>>,
    callback: Option<Arc<dyn ClosureObject>>,
    template_members: MemberSet,
    callback_members: MemberSet,
}

impl CaptureContext {
    /// Build a context from the template and callback closures, either of which may be
    /// absent.
    #[must_use]
    pub fn new(
        template: Option<Arc<dyn ClosureObject>>,
        callback: Option<Arc<dyn ClosureObject>>,
    ) -> Self {
        let template_members = MemberSet::of(template.as_ref());
        let callback_members = MemberSet::of(callback.as_ref());
        CaptureContext {
            template,
            callback,
            template_members,
            callback_members,
        }
    }

    /// Type of the template closure.
    #[must_use]
    pub fn template_type(&self) -> Option<CilTypeRc> {
        self.template.as_ref().map(|closure| closure.captured_type())
    }

    /// Type of the callback closure.
    #[must_use]
    pub fn callback_type(&self) -> Option<CilTypeRc> {
        self.callback.as_ref().map(|closure| closure.captured_type())
    }

    /// The closure declaring `field`, preferring the template closure.
    #[must_use]
    pub fn field_owner(&self, field: &FieldRc) -> Option<ClosureKind> {
        if self.template_members.fields.contains(field) {
            Some(ClosureKind::Template)
        } else if self.callback_members.fields.contains(field) {
            Some(ClosureKind::Callback)
        } else {
            None
        }
    }

    /// The closure declaring the property getter `getter`, preferring the template closure.
    #[must_use]
    pub fn getter_owner(&self, getter: &MethodRc) -> Option<ClosureKind> {
        if self.template_members.getters.contains(getter) {
            Some(ClosureKind::Template)
        } else if self.callback_members.getters.contains(getter) {
            Some(ClosureKind::Callback)
        } else {
            None
        }
    }

    /// Returns `true` if `field` is the template closure's reference to the callback closure.
    #[must_use]
    pub fn is_callback_reference(&self, field: &FieldRc) -> bool {
        self.template_members.fields.contains(field)
            && self
                .callback_type()
                .is_some_and(|callback| field.field_type == callback)
    }

    /// Returns `true` if `field` belongs to the given closure.
    #[must_use]
    pub fn owns_field(&self, owner: ClosureKind, field: &FieldRc) -> bool {
        self.members(owner).fields.contains(field)
    }

    /// Returns `true` if `getter` belongs to the given closure.
    #[must_use]
    pub fn owns_getter(&self, owner: ClosureKind, getter: &MethodRc) -> bool {
        self.members(owner).getters.contains(getter)
    }

    /// Read a field of one of the closures.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvableCapture`] if the closure is absent or does not own
    /// the field.
    pub fn read_field(&self, owner: ClosureKind, field: &FieldRc) -> Result<CapturedValue> {
        if !self.owns_field(owner, field) {
            return Err(Error::UnresolvableCapture(format!(
                "{field} is not captured by the {owner} closure"
            )));
        }
        self.closure(owner)?.read_field(field)
    }

    /// Invoke a property getter of one of the closures.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvableCapture`] if the closure is absent or does not own
    /// the getter.
    pub fn read_getter(&self, owner: ClosureKind, getter: &MethodRc) -> Result<CapturedValue> {
        if !self.owns_getter(owner, getter) {
            return Err(Error::UnresolvableCapture(format!(
                "{getter} is not a getter of the {owner} closure"
            )));
        }
        self.closure(owner)?.read_getter(getter)
    }

    fn members(&self, owner: ClosureKind) -> &MemberSet {
        match owner {
            ClosureKind::Template => &self.template_members,
            ClosureKind::Callback => &self.callback_members,
        }
    }

    fn closure(&self, owner: ClosureKind) -> Result<&Arc<dyn ClosureObject>> {
        match owner {
            ClosureKind::Template => self.template.as_ref(),
            ClosureKind::Callback => self.callback.as_ref(),
        }
        .ok_or_else(|| Error::UnresolvableCapture(format!("no {owner} closure is available")))
    }
}

impl fmt::Debug for CaptureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureContext")
            .field("template", &self.template_type())
            .field("callback", &self.callback_type())
            .field("template_fields", &self.template_members.fields.len())
            .field("callback_fields", &self.callback_members.fields.len())
            .finish()
    }
}

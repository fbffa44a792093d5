//! Method bodies as token streams.
//!
//! A [`MethodBody`] owns an ordered list of [`Local`]s and an ordered list of [`CilToken`]s.
//! Tokens are either instructions or [`Label`]s marking branch targets. Labels and locals
//! are compared by identity, not by value: two labels with the same name are different jump
//! targets, and two locals of the same type are different slots.

use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
    sync::Arc,
};

use crate::{assembly::instruction::Instruction, metadata::CilTypeRc};

/// A symbolic jump target, compared by identity.
#[derive(Clone)]
pub struct Label(Arc<str>);

impl Label {
    /// Create a new, distinct label.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Label(Arc::from(name))
    }

    /// The human readable name of the label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Label {}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0).cast::<u8>(), state);
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label({})", self.0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared type of a local variable, as found in a method's local signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDecl {
    /// Element type
    pub local_type: CilTypeRc,
    /// `pinned` modifier
    pub pinned: bool,
}

impl LocalDecl {
    /// Create a new declaration.
    #[must_use]
    pub fn new(local_type: CilTypeRc, pinned: bool) -> Self {
        LocalDecl { local_type, pinned }
    }
}

/// A local variable slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    /// Element type
    pub local_type: CilTypeRc,
    /// Optional human readable name
    pub name: Option<String>,
    /// `pinned` modifier
    pub pinned: bool,
}

impl LocalVariable {
    /// Create a new local variable description.
    #[must_use]
    pub fn new(local_type: CilTypeRc, name: Option<String>, pinned: bool) -> Self {
        LocalVariable {
            local_type,
            name,
            pinned,
        }
    }
}

/// A shared handle to a [`LocalVariable`], compared by identity.
#[derive(Clone)]
pub struct Local(Arc<LocalVariable>);

impl Local {
    /// Wrap a local variable into a new, distinct slot.
    #[must_use]
    pub fn new(variable: LocalVariable) -> Self {
        Local(Arc::new(variable))
    }
}

impl Deref for Local {
    type Target = LocalVariable;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for Local {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Local {}

impl Hash for Local {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Local({}: {}{})",
            self,
            self.local_type.fullname(),
            if self.pinned { " pinned" } else { "" }
        )
    }
}

impl fmt::Display for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => write!(f, "{:p}", Arc::as_ptr(&self.0)),
        }
    }
}

/// A unit of a method body stream.
#[derive(Debug, Clone, PartialEq)]
pub enum CilToken {
    /// Marks the position of a jump target
    Label(Label),
    /// An instruction
    Instruction(Instruction),
}

impl CilToken {
    /// The instruction, if this token is one.
    #[must_use]
    pub fn as_instruction(&self) -> Option<&Instruction> {
        match self {
            CilToken::Instruction(instruction) => Some(instruction),
            CilToken::Label(_) => None,
        }
    }

    /// The label, if this token is one.
    #[must_use]
    pub fn as_label(&self) -> Option<&Label> {
        match self {
            CilToken::Label(label) => Some(label),
            CilToken::Instruction(_) => None,
        }
    }
}

impl From<Instruction> for CilToken {
    fn from(instruction: Instruction) -> Self {
        CilToken::Instruction(instruction)
    }
}

impl From<Label> for CilToken {
    fn from(label: Label) -> Self {
        CilToken::Label(label)
    }
}

impl fmt::Display for CilToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CilToken::Label(label) => write!(f, "{label}:"),
            CilToken::Instruction(instruction) => write!(f, "    {instruction}"),
        }
    }
}

/// Locals and token stream of a method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodBody {
    /// Local variables in slot order
    pub locals: Vec<Local>,
    /// The instruction stream
    pub tokens: Vec<CilToken>,
}

impl MethodBody {
    /// Create an empty body.
    #[must_use]
    pub fn new() -> Self {
        MethodBody::default()
    }

    /// Create a body from existing locals and tokens.
    #[must_use]
    pub fn with_tokens(locals: Vec<Local>, tokens: Vec<CilToken>) -> Self {
        MethodBody { locals, tokens }
    }

    /// Append a new local variable and return its handle.
    pub fn add_local(&mut self, local_type: CilTypeRc, name: Option<String>, pinned: bool) -> Local {
        let local = Local::new(LocalVariable::new(local_type, name, pinned));
        self.locals.push(local.clone());
        local
    }

    /// Append an instruction.
    pub fn push(&mut self, instruction: Instruction) {
        self.tokens.push(CilToken::Instruction(instruction));
    }

    /// Append a label marker.
    pub fn mark(&mut self, label: Label) {
        self.tokens.push(CilToken::Label(label));
    }

    /// Iterate over the instructions, skipping labels.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.tokens.iter().filter_map(CilToken::as_instruction)
    }

    /// Iterate over the labels marked in the stream, in stream order.
    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.tokens.iter().filter_map(CilToken::as_label)
    }

    /// Slot index of a local in this body.
    #[must_use]
    pub fn local_index(&self, local: &Local) -> Option<usize> {
        self.locals.iter().position(|l| l == local)
    }
}

impl fmt::Display for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, local) in self.locals.iter().enumerate() {
            writeln!(f, ".local [{index}] {local:?}")?;
        }
        for token in &self.tokens {
            writeln!(f, "{token}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::test::create_type;

    #[test]
    fn labels_compare_by_identity() {
        let a = Label::new("Label_0");
        let b = Label::new("Label_0");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        let set: HashSet<Label> = [a.clone(), b, a].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn locals_compare_by_identity() {
        let ty = create_type(5, "System", "Int32");
        let first = Local::new(LocalVariable::new(ty.clone(), None, false));
        let second = Local::new(LocalVariable::new(ty, None, false));
        assert_ne!(first, second);
        assert_eq!(*first, *second);
        assert_eq!(first, first.clone());
    }

    #[test]
    fn body_helpers() {
        let ty = create_type(5, "System", "Int32");
        let mut body = MethodBody::new();
        let local = body.add_local(ty, Some("Local_0".to_string()), true);
        let label = Label::new("Label_0");
        body.mark(label.clone());
        body.push(Instruction::LoadLocal(local.clone()));
        body.push(Instruction::Return);

        assert_eq!(body.local_index(&local), Some(0));
        assert_eq!(body.instructions().count(), 2);
        assert_eq!(body.labels().collect::<Vec<_>>(), vec![&label]);

        let text = body.to_string();
        assert!(text.contains("Label_0:"));
        assert!(text.contains("ldloc Local_0"));
        assert!(text.contains("pinned"));
    }
}

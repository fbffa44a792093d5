//! Recognition of placeholder accesses and calls.
//!
//! Placeholder operations are instance methods of a well-known namespace type. A template
//! reaches the namespace instance either through a field of its own closure
//! (`ldarg.0; ldfld <namespace>`) or through a static accessor (`ldsfld Instance` or
//! `call get_Instance()`), and invokes one of the operations on it.

use std::str::FromStr;

use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    assembly::{CilToken, Instruction},
    metadata::{CilTypeRc, MethodRc},
    Error, Result,
};

/// The placeholder operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum PlaceholderKind {
    /// `Get(member)`: load a field, property or local
    Get,
    /// `Set(member, value)`: store into a field, property or local
    Set,
    /// `Ref(member)`: load the address of a field or local
    Ref,
    /// `Call(target, args...)`: invoke a method or delegate target
    Call,
}

impl PlaceholderKind {
    /// Returns `true` if the operation can be invoked with `arity` arguments.
    #[must_use]
    pub fn accepts_arity(self, arity: usize) -> bool {
        match self {
            PlaceholderKind::Get | PlaceholderKind::Ref => arity == 1,
            PlaceholderKind::Set => arity == 2,
            PlaceholderKind::Call => arity >= 1,
        }
    }

    /// The operation name as `&'static str`.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Recognizes accesses to and calls into the placeholder namespace type.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderNamespace {
    namespace: CilTypeRc,
}

impl PlaceholderNamespace {
    /// Wrap the namespace type.
    #[must_use]
    pub fn new(namespace: CilTypeRc) -> Self {
        PlaceholderNamespace { namespace }
    }

    /// The namespace type.
    #[must_use]
    pub fn namespace_type(&self) -> &CilTypeRc {
        &self.namespace
    }

    /// Number of tokens starting at `index` that load the namespace instance, if they do.
    ///
    /// `receiver_captures` enables the `ldarg.0; ldfld` form, which only exists for templates
    /// compiled with a receiver.
    #[must_use]
    pub fn access_len(
        &self,
        tokens: &[CilToken],
        index: usize,
        receiver_captures: bool,
    ) -> Option<usize> {
        match tokens.get(index)?.as_instruction()? {
            Instruction::LoadArgument(0) if receiver_captures => {
                match tokens.get(index + 1)?.as_instruction()? {
                    Instruction::LoadField(field) if field.field_type == self.namespace => Some(2),
                    _ => None,
                }
            }
            Instruction::LoadStaticField(field) if field.field_type == self.namespace => Some(1),
            Instruction::Call(method)
                if method.is_static()
                    && method.declaring_type == self.namespace
                    && method.return_type.as_ref() == Some(&self.namespace) =>
            {
                Some(1)
            }
            _ => None,
        }
    }

    /// The invoked operation, if `instruction` calls into the namespace.
    #[must_use]
    pub fn placeholder_call<'a>(&self, instruction: &'a Instruction) -> Option<&'a MethodRc> {
        match instruction {
            Instruction::Call(method)
                if !method.is_static() && method.declaring_type == self.namespace =>
            {
                Some(method)
            }
            _ => None,
        }
    }

    /// Identify the operation a placeholder method implements and validate its arity.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnsupportedPlaceholder`] for unknown names or arities.
    pub fn classify(&self, method: &MethodRc) -> Result<PlaceholderKind> {
        let kind = PlaceholderKind::from_str(&method.name).map_err(|_| {
            Error::UnsupportedPlaceholder(format!("'{method}' is not a placeholder operation"))
        })?;

        if !kind.accepts_arity(method.param_count()) {
            return Err(Error::UnsupportedPlaceholder(format!(
                "'{method}' takes {} argument(s), {kind} does not accept that",
                method.param_count()
            )));
        }

        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::MethodAttributes,
        test::{create_field, create_function, create_method, create_type},
    };

    #[test]
    fn names_and_arity() {
        assert_eq!(PlaceholderKind::from_str("Get").unwrap(), PlaceholderKind::Get);
        assert!(PlaceholderKind::from_str("Invoke").is_err());
        assert_eq!(PlaceholderKind::Ref.name(), "Ref");
        assert_eq!(PlaceholderKind::Set.to_string(), "Set");

        assert!(PlaceholderKind::Get.accepts_arity(1));
        assert!(!PlaceholderKind::Get.accepts_arity(2));
        assert!(PlaceholderKind::Set.accepts_arity(2));
        assert!(PlaceholderKind::Call.accepts_arity(4));
        assert!(!PlaceholderKind::Call.accepts_arity(0));
    }

    #[test]
    fn recognizes_accesses() {
        let namespace = create_type(40, "Templating", "EmitTemplateSurrogate");
        let closure = create_type(41, "", "<>c__DisplayClass0_0");
        let other = create_type(42, "Demo", "Widget");
        let placeholders = PlaceholderNamespace::new(namespace.clone());

        let via_closure = create_field(1, "s", &closure, &namespace, false);
        let instance = create_field(2, "<Instance>k__BackingField", &namespace, &namespace, true);
        let unrelated = create_field(3, "w", &closure, &other, false);
        let getter = create_function(
            4,
            "get_Instance",
            &namespace,
            &[],
            Some(&namespace),
            MethodAttributes::STATIC | MethodAttributes::SPECIAL_NAME,
        );

        let tokens: Vec<CilToken> = vec![
            Instruction::LoadArgument(0).into(),
            Instruction::LoadField(via_closure).into(),
            Instruction::LoadStaticField(instance).into(),
            Instruction::Call(getter).into(),
            Instruction::LoadArgument(0).into(),
            Instruction::LoadField(unrelated).into(),
        ];

        assert_eq!(placeholders.access_len(&tokens, 0, true), Some(2));
        assert_eq!(placeholders.access_len(&tokens, 0, false), None);
        assert_eq!(placeholders.access_len(&tokens, 2, false), Some(1));
        assert_eq!(placeholders.access_len(&tokens, 3, false), Some(1));
        assert_eq!(placeholders.access_len(&tokens, 4, true), None);
        assert_eq!(placeholders.access_len(&tokens, 6, true), None);
    }

    #[test]
    fn classifies_calls() {
        let namespace = create_type(40, "Templating", "EmitTemplateSurrogate");
        let placeholders = PlaceholderNamespace::new(namespace.clone());

        let get = create_method(1, "Get", &namespace, 1, false);
        let set = create_method(2, "Set", &namespace, 2, false);
        let bad_arity = create_method(3, "Set", &namespace, 1, false);
        let unknown = create_method(4, "Trace", &namespace, 1, false);
        let foreign = create_method(5, "Get", &create_type(42, "Demo", "Widget"), 1, false);

        assert!(placeholders.placeholder_call(&Instruction::Call(get.clone())).is_some());
        assert!(placeholders.placeholder_call(&Instruction::Call(foreign)).is_none());

        assert_eq!(placeholders.classify(&get).unwrap(), PlaceholderKind::Get);
        assert_eq!(placeholders.classify(&set).unwrap(), PlaceholderKind::Set);
        assert!(matches!(
            placeholders.classify(&bad_arity),
            Err(Error::UnsupportedPlaceholder(_))
        ));
        assert!(matches!(
            placeholders.classify(&unknown),
            Err(Error::UnsupportedPlaceholder(_))
        ));
    }
}

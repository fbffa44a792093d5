//! Placeholder expansion over decoded template bodies.
//!
//! The [`MacroExpander`] makes a single forward pass over a template's token stream:
//!
//! - ordinary instructions are copied, argument indices shifted by the configured offset
//! - `ldarg.0` in a template with a receiver starts capture resolution: the following field
//!   loads (one level into either closure, or two levels through the template closure's
//!   reference to the callback closure) or property getter call yield a captured value, which
//!   is materialized as a literal or an accessor call
//! - an access to the placeholder namespace starts a lookahead for the matching placeholder
//!   call; the tokens in between are sliced into argument expressions by their stack balance
//!   and the placeholder is replaced by direct member access
//!
//! Every anomaly aborts the pass and leaves the body untouched. Captured objects are only
//! handed to the type under construction and the capture table once the whole pass succeeded;
//! until then their call sites reference stand-in methods.

use std::{fmt, sync::Arc};

use rustc_hash::FxHashMap;

use crate::{
    assembly::{opcodes, CilToken, Instruction, Local, LocalVariable, MethodBody, Operand},
    metadata::{CilTypeRc, FieldRc, Method, MethodAttributes, MethodRc, Token},
    templating::{
        accessor::{define_accessor, AccessorRuntime, CapturedAccessor, TypeUnderConstruction},
        capture::{CaptureContext, CapturedObject, CapturedValue, ClosureKind, MemberDescriptor},
        literal::literal_instruction,
        placeholder::{PlaceholderKind, PlaceholderNamespace},
        slicing::{slice_arguments, slice_span},
        table::CaptureTable,
    },
    utils::cursor::Cursor,
    Error, Result,
};

/// Tunables of a [`MacroExpander`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpanderOptions {
    /// Added to every argument index copied from the template
    pub arg_offset: i32,
    /// The template has no receiver, so `ldarg.0` is an ordinary argument
    pub template_is_static: bool,
    /// The destination has no receiver, so instance members are unreachable
    pub destination_is_static: bool,
    /// Drop a final `ret` so the expansion can be spliced into a larger body
    pub trim_trailing_return: bool,
}

impl ExpanderOptions {
    /// Options for expanding a template into a destination with the given conventions.
    #[must_use]
    pub fn for_methods(template_is_static: bool, destination_is_static: bool) -> Self {
        ExpanderOptions {
            arg_offset: argument_offset(template_is_static, destination_is_static),
            template_is_static,
            destination_is_static,
            trim_trailing_return: true,
        }
    }
}

impl Default for ExpanderOptions {
    fn default() -> Self {
        ExpanderOptions::for_methods(false, false)
    }
}

/// Shift applied to argument indices: (destination has receiver) - (template has receiver).
#[must_use]
pub fn argument_offset(template_is_static: bool, destination_is_static: bool) -> i32 {
    i32::from(!destination_is_static) - i32::from(!template_is_static)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CaptureSite {
    Field(ClosureKind, FieldRc),
    Getter(ClosureKind, MethodRc),
}

enum CaptureAccess {
    Value(CapturedValue),
    Address {
        value: CapturedValue,
        value_type: CilTypeRc,
    },
}

/// Rewrites placeholder call sites of one template into direct member access.
pub struct MacroExpander<'a, B: TypeUnderConstruction + ?Sized> {
    captures: &'a CaptureContext,
    placeholders: PlaceholderNamespace,
    builder: &'a mut B,
    runtime: &'a AccessorRuntime,
    table: &'a CaptureTable,
    options: ExpanderOptions,
    memo: FxHashMap<CaptureSite, CapturedValue>,
    pending: Vec<(MethodRc, CapturedObject)>,
    pending_index: FxHashMap<usize, usize>,
    accessors: Vec<CapturedAccessor>,
    temporaries: Vec<Local>,
}

impl<'a, B: TypeUnderConstruction + ?Sized> MacroExpander<'a, B> {
    /// Create an expander.
    ///
    /// ## Arguments
    /// * `captures` - The closures the template observes
    /// * `namespace` - The type declaring the placeholder operations
    /// * `builder` - The type the template expands into
    /// * `runtime` - Host identities used by generated accessors
    /// * `table` - Where captured objects are parked for their accessors
    pub fn new(
        captures: &'a CaptureContext,
        namespace: CilTypeRc,
        builder: &'a mut B,
        runtime: &'a AccessorRuntime,
        table: &'a CaptureTable,
    ) -> Self {
        MacroExpander {
            captures,
            placeholders: PlaceholderNamespace::new(namespace),
            builder,
            runtime,
            table,
            options: ExpanderOptions::default(),
            memo: FxHashMap::default(),
            pending: Vec::new(),
            pending_index: FxHashMap::default(),
            accessors: Vec::new(),
            temporaries: Vec::new(),
        }
    }

    /// Replace the default options.
    #[must_use]
    pub fn with_options(mut self, options: ExpanderOptions) -> Self {
        self.options = options;
        self
    }

    /// Accessors generated for captured objects by the last successful pass.
    #[must_use]
    pub fn accessors(&self) -> &[CapturedAccessor] {
        &self.accessors
    }

    /// Expand every placeholder in `body`.
    ///
    /// On success the tokens are replaced, synthesized temporaries are appended to the
    /// body's locals and one accessor per captured object is defined. On failure the body is
    /// left untouched, nothing is defined and nothing stays in the capture table.
    ///
    /// # Errors
    /// Returns the structural error that aborted the pass, see [`crate::Error`].
    pub fn expand(&mut self, body: &mut MethodBody) -> Result<()> {
        self.memo.clear();
        self.temporaries.clear();
        self.pending.clear();
        self.pending_index.clear();
        self.accessors.clear();

        let mut tokens = body.tokens.as_slice();
        if self.options.trim_trailing_return {
            if let Some((CilToken::Instruction(Instruction::Return), rest)) = tokens.split_last() {
                tokens = rest;
            }
        }

        let result = self
            .expand_tokens(tokens)
            .and_then(|mut expanded| self.commit_accessors(&mut expanded).map(|()| expanded));
        self.pending.clear();
        self.pending_index.clear();

        body.tokens = result?;
        body.locals.append(&mut self.temporaries);
        Ok(())
    }

    /// Define the accessors of every object captured during the pass and point the stand-in
    /// call sites at them.
    fn commit_accessors(&mut self, tokens: &mut [CilToken]) -> Result<()> {
        let mut defined: Vec<(MethodRc, CapturedAccessor)> = Vec::with_capacity(self.pending.len());
        for (stand_in, object) in std::mem::take(&mut self.pending) {
            match define_accessor(&mut *self.builder, self.runtime, self.table, object) {
                Ok(accessor) => defined.push((stand_in, accessor)),
                Err(error) => {
                    for (_, accessor) in &defined {
                        if let Err(rollback) = self.table.take(accessor.key) {
                            log::warn!("could not withdraw capture {}: {rollback}", accessor.key);
                        }
                    }
                    return Err(error);
                }
            }
        }

        for token in tokens.iter_mut() {
            if let CilToken::Instruction(Instruction::Call(method)) = token {
                if let Some((_, accessor)) = defined
                    .iter()
                    .find(|(stand_in, _)| Arc::ptr_eq(stand_in, method))
                {
                    *method = accessor.method.clone();
                }
            }
        }

        self.accessors = defined.into_iter().map(|(_, accessor)| accessor).collect();
        Ok(())
    }

    fn receiver_captures(&self) -> bool {
        !self.options.template_is_static
    }

    fn expand_tokens(&mut self, tokens: &[CilToken]) -> Result<Vec<CilToken>> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut cursor = Cursor::new(tokens);
        while let Some(token) = cursor.peek() {
            let index = cursor.pos();
            let instruction = match token {
                CilToken::Label(label) => {
                    out.push(CilToken::Label(label.clone()));
                    cursor.advance()?;
                    continue;
                }
                CilToken::Instruction(instruction) => instruction,
            };

            if let Some(len) = self
                .placeholders
                .access_len(tokens, index, self.receiver_captures())
            {
                self.expand_placeholder(&mut cursor, len, &mut out)?;
                continue;
            }

            if self.receiver_captures() && *instruction == Instruction::LoadArgument(0) {
                let (access, len) = self.resolve_receiver(tokens, index)?;
                self.emit_capture(access, &mut out)?;
                cursor.advance_by(len)?;
                continue;
            }

            if let Some(method) = self.placeholders.placeholder_call(instruction) {
                return Err(Error::UnsupportedPlaceholder(format!(
                    "'{method}' at token {index} is called without a placeholder access"
                )));
            }

            out.push(self.shift_arguments(instruction)?.into());
            cursor.advance()?;
        }
        Ok(out)
    }

    fn shift_arguments(&self, instruction: &Instruction) -> Result<Instruction> {
        let shift = |index: u16| -> Result<u16> {
            let adjusted = i64::from(index) + i64::from(self.options.arg_offset);
            u16::try_from(adjusted).map_err(|_| Error::InvalidArgumentIndex(adjusted))
        };

        Ok(match instruction {
            Instruction::LoadArgument(index) => Instruction::LoadArgument(shift(*index)?),
            Instruction::LoadArgumentAddress(index) => {
                Instruction::LoadArgumentAddress(shift(*index)?)
            }
            Instruction::StoreArgument(index) => Instruction::StoreArgument(shift(*index)?),
            other => other.clone(),
        })
    }

    fn resolve_receiver(
        &mut self,
        tokens: &[CilToken],
        index: usize,
    ) -> Result<(CaptureAccess, usize)> {
        let mut cursor = Cursor::new(tokens);
        cursor.seek(index + 1)?;
        let next = cursor.peek().and_then(CilToken::as_instruction);

        if let Some(Instruction::LoadField(field)) = next {
            if self.captures.is_callback_reference(field) {
                let chained = cursor.peek_nth(1).and_then(CilToken::as_instruction);
                return match self.closure_access(chained, &[ClosureKind::Callback])? {
                    Some(access) => Ok((access, 3)),
                    None => Err(Error::UnresolvableCapture(format!(
                        "{} at token {} does not read a callback capture",
                        describe(chained),
                        index + 2
                    ))),
                };
            }
        }

        match self.closure_access(next, &[ClosureKind::Template, ClosureKind::Callback])? {
            Some(access) => Ok((access, 2)),
            None => Err(Error::UnresolvableCapture(format!(
                "{} after ldarg.0 at token {} is not a capture access",
                describe(next),
                index
            ))),
        }
    }

    fn closure_access(
        &mut self,
        instruction: Option<&Instruction>,
        owners: &[ClosureKind],
    ) -> Result<Option<CaptureAccess>> {
        let field_owner = |field: &FieldRc| {
            owners
                .iter()
                .copied()
                .find(|owner| self.captures.owns_field(*owner, field))
        };

        match instruction {
            Some(Instruction::LoadField(field)) => match field_owner(field) {
                Some(owner) => {
                    let value = self.read_capture(CaptureSite::Field(owner, field.clone()))?;
                    Ok(Some(CaptureAccess::Value(value)))
                }
                None => Ok(None),
            },
            Some(Instruction::LoadFieldAddress(field)) => match field_owner(field) {
                Some(owner) => {
                    let value = self.read_capture(CaptureSite::Field(owner, field.clone()))?;
                    Ok(Some(CaptureAccess::Address {
                        value,
                        value_type: field.field_type.clone(),
                    }))
                }
                None => Ok(None),
            },
            Some(Instruction::Call(getter)) => {
                let owner = owners
                    .iter()
                    .copied()
                    .find(|owner| self.captures.owns_getter(*owner, getter));
                match owner {
                    Some(owner) => {
                        let value =
                            self.read_capture(CaptureSite::Getter(owner, getter.clone()))?;
                        Ok(Some(CaptureAccess::Value(value)))
                    }
                    None => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    fn read_capture(&mut self, site: CaptureSite) -> Result<CapturedValue> {
        if let Some(value) = self.memo.get(&site) {
            return Ok(value.clone());
        }

        let value = match &site {
            CaptureSite::Field(owner, field) => self.captures.read_field(*owner, field)?,
            CaptureSite::Getter(owner, getter) => self.captures.read_getter(*owner, getter)?,
        };
        self.memo.insert(site, value.clone());
        Ok(value)
    }

    fn emit_capture(&mut self, access: CaptureAccess, out: &mut Vec<CilToken>) -> Result<()> {
        match access {
            CaptureAccess::Value(value) => self.materialize(&value, out),
            CaptureAccess::Address { value, value_type } => {
                let temporary = Local::new(LocalVariable::new(
                    value_type,
                    Some(format!("Temp_{}", self.temporaries.len())),
                    false,
                ));
                self.temporaries.push(temporary.clone());

                self.materialize(&value, out)?;
                out.push(Instruction::StoreLocal(temporary.clone()).into());
                out.push(Instruction::LoadLocalAddress(temporary).into());
                Ok(())
            }
        }
    }

    fn materialize(&mut self, value: &CapturedValue, out: &mut Vec<CilToken>) -> Result<()> {
        if let Some(instruction) = literal_instruction(value) {
            out.push(instruction.into());
            return Ok(());
        }

        match value {
            CapturedValue::Object(object) => {
                let accessor = self.accessor_for(object);
                out.push(Instruction::Call(accessor).into());
                Ok(())
            }
            other => Err(Error::UnresolvableCapture(format!(
                "{other} can only be used as a placeholder argument"
            ))),
        }
    }

    /// The stand-in for the accessor of `object`, shared by every capture of the same object
    /// within the pass.
    fn accessor_for(&mut self, object: &CapturedObject) -> MethodRc {
        let address = object.address() as usize;
        if let Some(&index) = self.pending_index.get(&address) {
            return self.pending[index].0.clone();
        }

        let object_type = object.object_type().clone();
        let stand_in = Arc::new(Method {
            token: Token::new(0),
            name: format!("<>pending_capture_{}", self.pending.len()),
            declaring_type: object_type.clone(),
            params: Vec::new(),
            return_type: Some(object_type),
            flags: MethodAttributes::PRIVATE | MethodAttributes::STATIC,
        });
        self.pending_index.insert(address, self.pending.len());
        self.pending.push((stand_in.clone(), object.clone()));
        stand_in
    }

    /// Expand the placeholder whose namespace access starts at the cursor and leave the
    /// cursor after its call.
    fn expand_placeholder(
        &mut self,
        cursor: &mut Cursor<'_, CilToken>,
        access_len: usize,
        out: &mut Vec<CilToken>,
    ) -> Result<()> {
        let start = cursor.pos();
        cursor.advance_by(access_len)?;
        let call_index = self.find_placeholder_call(cursor.data(), start, cursor.pos())?;
        let span = cursor.slice(cursor.pos()..call_index)?;
        cursor.seek(call_index)?;

        let placeholder = cursor
            .consume()?
            .as_instruction()
            .and_then(|instruction| self.placeholders.placeholder_call(instruction))
            .cloned()
            .ok_or(Error::UnterminatedPlaceholder(start))?;
        let kind = self.placeholders.classify(&placeholder)?;

        let arguments = slice_span(span, placeholder.param_count())?;
        let span = span.data();
        log::debug!(
            "expanding {kind} placeholder at token {start} with {} argument(s)",
            arguments.len()
        );

        match kind {
            PlaceholderKind::Get => self.expand_get(&span[arguments[0].clone()], out)?,
            PlaceholderKind::Set => self.expand_set(
                &span[arguments[0].clone()],
                &span[arguments[1].clone()],
                out,
            )?,
            PlaceholderKind::Ref => self.expand_ref(&span[arguments[0].clone()], out)?,
            PlaceholderKind::Call => {
                let values = arguments[1..]
                    .iter()
                    .map(|range| &span[range.clone()])
                    .collect::<Vec<_>>();
                self.expand_call(&placeholder, &span[arguments[0].clone()], &values, out)?;
            }
        }

        Ok(())
    }

    fn find_placeholder_call(&self, tokens: &[CilToken], start: usize, from: usize) -> Result<usize> {
        let mut cursor = Cursor::new(tokens);
        cursor.seek(from)?;
        let mut depth = 0usize;
        while cursor.has_more_data() {
            let index = cursor.pos();
            if let Some(len) = self
                .placeholders
                .access_len(tokens, index, self.receiver_captures())
            {
                depth += 1;
                cursor.advance_by(len)?;
                continue;
            }

            match cursor.consume()? {
                CilToken::Label(label) => {
                    return Err(Error::ControlFlowInPlaceholder(format!(
                        "label '{label}' inside the placeholder starting at token {start}"
                    )))
                }
                CilToken::Instruction(instruction) => {
                    if instruction.is_control_transfer() {
                        return Err(Error::ControlFlowInPlaceholder(format!(
                            "'{instruction}' at token {index} inside the placeholder starting at token {start}"
                        )));
                    }
                    if self.placeholders.placeholder_call(instruction).is_some() {
                        if depth == 0 {
                            return Ok(index);
                        }
                        depth -= 1;
                    }
                }
            }
        }

        Err(Error::UnterminatedPlaceholder(start))
    }

    fn captured_argument(
        &mut self,
        span: &[CilToken],
        operation: PlaceholderKind,
    ) -> Result<CapturedValue> {
        if self.receiver_captures() && instruction_at(span, 0) == Some(&Instruction::LoadArgument(0))
        {
            let (access, len) = self.resolve_receiver(span, 0)?;
            if let (CaptureAccess::Value(value), true) = (access, len == span.len()) {
                return Ok(value);
            }
        }

        Err(Error::UnresolvableCapture(format!(
            "the {operation} target must be a captured member, found '{}'",
            render(span)
        )))
    }

    fn member_argument(
        &mut self,
        span: &[CilToken],
        operation: PlaceholderKind,
    ) -> Result<MemberDescriptor> {
        match self.captured_argument(span, operation)? {
            CapturedValue::Member(member) => Ok(member),
            other => Err(Error::WrongMemberKind {
                operation: operation.name(),
                member: other.to_string(),
            }),
        }
    }

    fn load_receiver(&self, member: &dyn fmt::Display, out: &mut Vec<CilToken>) -> Result<()> {
        if self.options.destination_is_static {
            return Err(Error::InstanceMemberInStaticContext(member.to_string()));
        }
        out.push(Instruction::LoadArgument(0).into());
        Ok(())
    }

    fn expand_value(&mut self, span: &[CilToken], out: &mut Vec<CilToken>) -> Result<()> {
        let expanded = self.expand_tokens(span)?;
        out.extend(expanded);
        Ok(())
    }

    fn expand_get(&mut self, target: &[CilToken], out: &mut Vec<CilToken>) -> Result<()> {
        let member = self.member_argument(target, PlaceholderKind::Get)?;
        match &member {
            MemberDescriptor::Field(field) if field.is_static() => {
                out.push(Instruction::LoadStaticField(field.clone()).into());
            }
            MemberDescriptor::Field(field) => {
                self.load_receiver(&member, out)?;
                out.push(Instruction::LoadField(field.clone()).into());
            }
            MemberDescriptor::Property(property) => {
                let getter = property.getter.clone().ok_or_else(|| Error::WrongMemberKind {
                    operation: PlaceholderKind::Get.name(),
                    member: format!("{member} without getter"),
                })?;
                if !getter.is_static() {
                    self.load_receiver(&member, out)?;
                }
                out.push(Instruction::Call(getter).into());
            }
            MemberDescriptor::Local(local) => {
                out.push(Instruction::LoadLocal(local.clone()).into());
            }
            MemberDescriptor::Method(_) => {
                return Err(Error::WrongMemberKind {
                    operation: PlaceholderKind::Get.name(),
                    member: member.to_string(),
                })
            }
        }
        Ok(())
    }

    fn expand_set(
        &mut self,
        target: &[CilToken],
        value: &[CilToken],
        out: &mut Vec<CilToken>,
    ) -> Result<()> {
        let member = self.member_argument(target, PlaceholderKind::Set)?;
        match &member {
            MemberDescriptor::Field(field) if field.is_static() => {
                self.expand_value(value, out)?;
                out.push(Instruction::StoreStaticField(field.clone()).into());
            }
            MemberDescriptor::Field(field) => {
                self.load_receiver(&member, out)?;
                self.expand_value(value, out)?;
                out.push(Instruction::StoreField(field.clone()).into());
            }
            MemberDescriptor::Property(property) => {
                let setter = property.setter.clone().ok_or_else(|| Error::WrongMemberKind {
                    operation: PlaceholderKind::Set.name(),
                    member: format!("{member} without setter"),
                })?;
                if !setter.is_static() {
                    self.load_receiver(&member, out)?;
                }
                self.expand_value(value, out)?;
                out.push(Instruction::Call(setter).into());
            }
            MemberDescriptor::Local(local) => {
                self.expand_value(value, out)?;
                out.push(Instruction::StoreLocal(local.clone()).into());
            }
            MemberDescriptor::Method(_) => {
                return Err(Error::WrongMemberKind {
                    operation: PlaceholderKind::Set.name(),
                    member: member.to_string(),
                })
            }
        }
        Ok(())
    }

    fn expand_ref(&mut self, target: &[CilToken], out: &mut Vec<CilToken>) -> Result<()> {
        let member = self.member_argument(target, PlaceholderKind::Ref)?;
        match &member {
            MemberDescriptor::Field(field) if field.is_static() => {
                out.push(Instruction::LoadStaticFieldAddress(field.clone()).into());
            }
            MemberDescriptor::Field(field) => {
                self.load_receiver(&member, out)?;
                out.push(Instruction::LoadFieldAddress(field.clone()).into());
            }
            MemberDescriptor::Local(local) => {
                out.push(Instruction::LoadLocalAddress(local.clone()).into());
            }
            MemberDescriptor::Property(_) | MemberDescriptor::Method(_) => {
                return Err(Error::WrongMemberKind {
                    operation: PlaceholderKind::Ref.name(),
                    member: member.to_string(),
                })
            }
        }
        Ok(())
    }

    fn expand_call(
        &mut self,
        placeholder: &MethodRc,
        target: &[CilToken],
        values: &[&[CilToken]],
        out: &mut Vec<CilToken>,
    ) -> Result<()> {
        let method = self.call_target(target)?;
        if method.param_count() != values.len() {
            return Err(Error::UnsupportedPlaceholder(format!(
                "'{method}' takes {} argument(s), Call passes {}",
                method.param_count(),
                values.len()
            )));
        }

        if !method.is_static() {
            self.load_receiver(&method, out)?;
        }
        for value in values {
            self.expand_value(value, out)?;
        }
        out.push(Instruction::Call(method.clone()).into());

        match (method.returns_void(), placeholder.returns_void()) {
            (false, true) => out.push(Instruction::raw(opcodes::POP).into()),
            (true, false) => {
                return Err(Error::UnsupportedPlaceholder(format!(
                    "'{method}' returns nothing but '{placeholder}' expects a value"
                )))
            }
            _ => {}
        }
        Ok(())
    }

    fn call_target(&mut self, span: &[CilToken]) -> Result<MethodRc> {
        if let Some(Instruction::Raw {
            opcode,
            operand: Operand::Method(constructor),
        }) = span.last().and_then(CilToken::as_instruction)
        {
            if *opcode == opcodes::NEWOBJ {
                return delegate_target(&span[..span.len() - 1], constructor);
            }
        }

        match self.captured_argument(span, PlaceholderKind::Call)? {
            CapturedValue::Member(MemberDescriptor::Method(method))
            | CapturedValue::Delegate(method) => Ok(method),
            other => Err(Error::WrongMemberKind {
                operation: PlaceholderKind::Call.name(),
                member: other.to_string(),
            }),
        }
    }
}

/// The method bound by a `newobj` delegate construction, recovered from its method pointer
/// argument.
fn delegate_target(arguments: &[CilToken], constructor: &MethodRc) -> Result<MethodRc> {
    if constructor.param_count() != 2 {
        return Err(Error::UnresolvableCapture(format!(
            "'{constructor}' is not a delegate constructor"
        )));
    }

    let parts = slice_arguments(arguments, 2)?;
    let method = match arguments[parts[1].clone()]
        .last()
        .and_then(CilToken::as_instruction)
    {
        Some(Instruction::Raw {
            opcode,
            operand: Operand::Method(method),
        }) if *opcode == opcodes::LDFTN || *opcode == opcodes::LDVIRTFTN => method.clone(),
        _ => {
            return Err(Error::UnresolvableCapture(format!(
                "delegate construction '{constructor}' does not bind a method pointer"
            )))
        }
    };

    // Instance targets are called on the destination's receiver, so the delegate must not
    // be bound to anything else.
    let target = &arguments[parts[0].clone()];
    if !method.is_static() && !binds_receiver(target) {
        return Err(Error::UnresolvableCapture(format!(
            "delegate construction '{constructor}' binds '{method}' to '{}'",
            render(target)
        )));
    }
    Ok(method)
}

fn binds_receiver(target: &[CilToken]) -> bool {
    match target {
        [CilToken::Instruction(Instruction::LoadArgument(0))] => true,
        [CilToken::Instruction(Instruction::Raw { opcode, .. })] => *opcode == opcodes::LDNULL,
        _ => false,
    }
}

fn instruction_at(tokens: &[CilToken], index: usize) -> Option<&Instruction> {
    tokens.get(index).and_then(CilToken::as_instruction)
}

fn describe(instruction: Option<&Instruction>) -> String {
    instruction.map_or_else(
        || "end of stream or label".to_string(),
        |instruction| format!("'{instruction}'"),
    )
}

fn render(span: &[CilToken]) -> String {
    span.iter()
        .map(|token| token.to_string().trim().to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

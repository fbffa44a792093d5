//! Shared fixtures for unit tests.

use std::sync::Arc;

use crate::{
    assembly::{opcodes::OpCode, CodeSink, EmitOperand, Instruction, LocalSlot, MethodBody},
    metadata::{
        CilType, CilTypeRc, Field, FieldAttributes, FieldRc, Method, MethodAttributes, MethodRc,
        Token, TypeFlavor,
    },
    templating::{
        AccessorRuntime, CaptureContext, CapturedValue, Closure, TypeUnderConstruction,
    },
    Error, Result,
};

// Helper function to create a TypeDef in the "Demo" assembly
pub fn create_type(row: u32, namespace: &str, name: &str) -> CilTypeRc {
    Arc::new(CilType::new(
        Token::new(0x0200_0000 + row),
        namespace,
        name,
        "Demo",
    ))
}

// Helper function to create a Field
pub fn create_field(
    row: u32,
    name: &str,
    declaring_type: &CilTypeRc,
    field_type: &CilTypeRc,
    is_static: bool,
) -> FieldRc {
    let mut flags = FieldAttributes::PUBLIC;
    if is_static {
        flags |= FieldAttributes::STATIC;
    }

    Arc::new(Field {
        token: Token::new(0x0400_0000 + row),
        name: name.to_string(),
        declaring_type: declaring_type.clone(),
        field_type: field_type.clone(),
        flags,
    })
}

// Helper function to create a void Method taking `param_count` Int32 parameters
pub fn create_method(
    row: u32,
    name: &str,
    declaring_type: &CilTypeRc,
    param_count: usize,
    is_static: bool,
) -> MethodRc {
    let int32 = create_type(8, "System", "Int32");
    let mut flags = MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG;
    if is_static {
        flags |= MethodAttributes::STATIC;
    }

    create_function(
        row,
        name,
        declaring_type,
        &vec![int32; param_count],
        None,
        flags,
    )
}

// Helper function to create a Method with an explicit signature
pub fn create_function(
    row: u32,
    name: &str,
    declaring_type: &CilTypeRc,
    params: &[CilTypeRc],
    return_type: Option<&CilTypeRc>,
    flags: MethodAttributes,
) -> MethodRc {
    Arc::new(Method {
        token: Token::new(0x0600_0000 + row),
        name: name.to_string(),
        declaring_type: declaring_type.clone(),
        params: params.to_vec(),
        return_type: return_type.cloned(),
        flags,
    })
}

/// One `emit` call seen by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub opcode: OpCode,
    pub operand: EmitOperand<usize>,
}

impl Recorded {
    pub fn op(opcode: OpCode) -> Self {
        Recorded {
            opcode,
            operand: EmitOperand::None,
        }
    }

    pub fn with(opcode: OpCode, operand: EmitOperand<usize>) -> Self {
        Recorded { opcode, operand }
    }
}

/// A [`CodeSink`] that only records what it is asked to do.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub emitted: Vec<Recorded>,
    pub locals: Vec<(CilTypeRc, bool)>,
    pub labels_defined: usize,
    /// (label, number of instructions emitted before the mark)
    pub marks: Vec<(usize, usize)>,
}

impl CodeSink for RecordingSink {
    type Label = usize;

    fn declare_local(&mut self, local_type: &CilTypeRc, pinned: bool) -> Result<LocalSlot> {
        let slot = u16::try_from(self.locals.len()).map_err(|_| Error::OutOfBounds)?;
        self.locals.push((local_type.clone(), pinned));
        Ok(LocalSlot(slot))
    }

    fn define_label(&mut self) -> usize {
        self.labels_defined += 1;
        self.labels_defined - 1
    }

    fn mark_label(&mut self, label: usize) -> Result<()> {
        if self.marks.iter().any(|(marked, _)| *marked == label) {
            return Err(Error::DuplicateLabel(label.to_string()));
        }
        self.marks.push((label, self.emitted.len()));
        Ok(())
    }

    fn emit(&mut self, opcode: OpCode, operand: EmitOperand<usize>) -> Result<()> {
        self.emitted.push(Recorded { opcode, operand });
        Ok(())
    }
}

// Helper function to create the host identities used by capture accessors
pub fn accessor_runtime() -> AccessorRuntime {
    let int32 = Arc::new(
        (*create_type(8, "System", "Int32"))
            .clone()
            .with_flavor(TypeFlavor::ValueType),
    );
    let int64 = Arc::new(
        (*create_type(9, "System", "Int64"))
            .clone()
            .with_flavor(TypeFlavor::ValueType),
    );
    let object = create_type(6, "System", "Object");
    let table = create_type(90, "Templating", "CaptureTable");
    let interlocked = create_type(91, "System.Threading", "Interlocked");

    AccessorRuntime {
        take_method: create_function(
            90,
            "Take",
            &table,
            &[int64],
            Some(&object),
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        ),
        claim_method: create_function(
            91,
            "CompareExchange",
            &interlocked,
            &[int32.clone(), int32.clone(), int32.clone()],
            Some(&int32),
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        ),
        flag_type: int32,
        object_type: object,
    }
}

/// A [`TypeUnderConstruction`] keeping everything it was asked to define.
#[derive(Debug)]
pub struct TestTypeBuilder {
    pub assembly: String,
    pub declaring_type: CilTypeRc,
    pub fields: Vec<FieldRc>,
    pub methods: Vec<(MethodRc, MethodBody)>,
    pub grants: Vec<String>,
}

impl TestTypeBuilder {
    pub fn new(assembly: &str) -> Self {
        TestTypeBuilder {
            assembly: assembly.to_string(),
            declaring_type: Arc::new(CilType::new(
                Token::new(0x0200_0100),
                "",
                "<>Template",
                assembly,
            )),
            fields: Vec::new(),
            methods: Vec::new(),
            grants: Vec::new(),
        }
    }
}

impl TypeUnderConstruction for TestTypeBuilder {
    fn assembly_name(&self) -> &str {
        &self.assembly
    }

    fn define_hidden_static_field(&mut self, name: &str, field_type: &CilTypeRc) -> Result<FieldRc> {
        let row = u32::try_from(self.fields.len()).map_err(|_| Error::OutOfBounds)? + 0x100;
        let field = Arc::new(Field {
            token: Token::new(0x0400_0000 + row),
            name: name.to_string(),
            declaring_type: self.declaring_type.clone(),
            field_type: field_type.clone(),
            flags: FieldAttributes::PRIVATE | FieldAttributes::STATIC,
        });
        self.fields.push(field.clone());
        Ok(field)
    }

    fn define_hidden_static_method(
        &mut self,
        name: &str,
        return_type: &CilTypeRc,
        body: MethodBody,
    ) -> Result<MethodRc> {
        let row = u32::try_from(self.methods.len()).map_err(|_| Error::OutOfBounds)? + 0x100;
        let method = create_function(
            row,
            name,
            &self.declaring_type,
            &[],
            Some(return_type),
            MethodAttributes::PRIVATE | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG,
        );
        self.methods.push((method.clone(), body));
        Ok(method)
    }

    fn grants_access_to(&self, assembly: &str) -> bool {
        self.grants.iter().any(|granted| granted == assembly)
    }

    fn grant_access_to(&mut self, assembly: &str) -> Result<()> {
        self.grants.push(assembly.to_string());
        Ok(())
    }
}

/// Types and members shared by the templating tests.
///
/// The template closure holds the namespace surrogate `s` and the reference to the callback
/// closure `outer`; the callback closure holds whatever a test captures.
pub struct TemplateFixture {
    pub int32: CilTypeRc,
    pub object: CilTypeRc,
    pub namespace: CilTypeRc,
    pub widget: CilTypeRc,
    pub template_type: CilTypeRc,
    pub callback_type: CilTypeRc,
    pub surrogate: FieldRc,
    pub outer: FieldRc,
    pub get: MethodRc,
    pub set: MethodRc,
    pub reference: MethodRc,
    /// `void Call(object, int)`
    pub call: MethodRc,
    /// `int Call(object, int)`
    pub call_value: MethodRc,
    /// `Widget::count`, instance Int32
    pub count: FieldRc,
    /// `Widget::total`, static Int32
    pub total: FieldRc,
    pub runtime: AccessorRuntime,
}

impl TemplateFixture {
    pub fn new() -> Self {
        let int32 = Arc::new(
            (*create_type(8, "System", "Int32"))
                .clone()
                .with_flavor(TypeFlavor::ValueType),
        );
        let object = create_type(6, "System", "Object");
        let namespace = create_type(40, "Templating", "EmitTemplateSurrogate");
        let widget = create_type(42, "Demo", "Widget");
        let callback_type = create_type(20, "", "<>c__DisplayClass0_0");
        let template_type = create_type(21, "", "<>c__DisplayClass0_1");

        let instance = MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG;

        TemplateFixture {
            surrogate: create_field(1, "s", &template_type, &namespace, false),
            outer: create_field(2, "CS$<>8__locals1", &template_type, &callback_type, false),
            get: create_function(41, "Get", &namespace, &[object.clone()], Some(&int32), instance),
            set: create_function(
                42,
                "Set",
                &namespace,
                &[object.clone(), int32.clone()],
                None,
                instance,
            ),
            reference: create_function(
                43,
                "Ref",
                &namespace,
                &[object.clone()],
                Some(&int32),
                instance,
            ),
            call: create_function(
                44,
                "Call",
                &namespace,
                &[object.clone(), int32.clone()],
                None,
                instance,
            ),
            call_value: create_function(
                45,
                "Call",
                &namespace,
                &[object.clone(), int32.clone()],
                Some(&int32),
                instance,
            ),
            count: create_field(3, "count", &widget, &int32, false),
            total: create_field(4, "total", &widget, &int32, true),
            runtime: accessor_runtime(),
            int32,
            object,
            namespace,
            widget,
            template_type,
            callback_type,
        }
    }

    pub fn callback_field(&self, row: u32, name: &str, field_type: &CilTypeRc) -> FieldRc {
        create_field(row, name, &self.callback_type, field_type, false)
    }

    pub fn context(&self, captures: &[(FieldRc, CapturedValue)]) -> CaptureContext {
        self.context_with_template(captures, &[])
    }

    pub fn context_with_template(
        &self,
        callback_captures: &[(FieldRc, CapturedValue)],
        template_captures: &[(FieldRc, CapturedValue)],
    ) -> CaptureContext {
        let callback = callback_captures
            .iter()
            .fold(Closure::new(self.callback_type.clone()), |closure, (field, value)| {
                closure.with_field(field.clone(), value.clone())
            });
        let template = template_captures.iter().fold(
            Closure::new(self.template_type.clone())
                .with_field(self.surrogate.clone(), CapturedValue::Null)
                .with_field(self.outer.clone(), CapturedValue::Null),
            |closure, (field, value)| closure.with_field(field.clone(), value.clone()),
        );

        CaptureContext::new(Some(Arc::new(template)), Some(Arc::new(callback)))
    }

    /// `ldarg.0; ldfld s`
    pub fn access(&self) -> Vec<Instruction> {
        vec![
            Instruction::LoadArgument(0),
            Instruction::LoadField(self.surrogate.clone()),
        ]
    }

    /// `ldarg.0; ldfld outer; ldfld <field>`
    pub fn capture(&self, field: &FieldRc) -> Vec<Instruction> {
        vec![
            Instruction::LoadArgument(0),
            Instruction::LoadField(self.outer.clone()),
            Instruction::LoadField(field.clone()),
        ]
    }
}

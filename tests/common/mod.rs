//! A minimal host shared by the integration tests: a handful of types and members registered in
//! a [`SymbolTable`], the placeholder namespace, and an in-memory type under construction.

#![allow(dead_code)]

use std::sync::Arc;

use dotemit::prelude::*;

pub const TEMPLATE_ASSEMBLY: &str = "Demo.Templates";

fn class(row: u32, namespace: &str, name: &str, assembly: &str) -> CilTypeRc {
    Arc::new(CilType::new(
        Token::new(0x0200_0000 + row),
        namespace,
        name,
        assembly,
    ))
}

fn value_type(row: u32, namespace: &str, name: &str) -> CilTypeRc {
    Arc::new(
        CilType::new(Token::new(0x0200_0000 + row), namespace, name, "System.Runtime")
            .with_flavor(TypeFlavor::ValueType),
    )
}

pub fn field(row: u32, name: &str, owner: &CilTypeRc, ty: &CilTypeRc, flags: FieldAttributes) -> FieldRc {
    Arc::new(Field {
        token: Token::new(0x0400_0000 + row),
        name: name.to_string(),
        declaring_type: owner.clone(),
        field_type: ty.clone(),
        flags,
    })
}

pub fn method(
    row: u32,
    name: &str,
    owner: &CilTypeRc,
    params: &[CilTypeRc],
    return_type: Option<&CilTypeRc>,
    flags: MethodAttributes,
) -> MethodRc {
    Arc::new(Method {
        token: Token::new(0x0600_0000 + row),
        name: name.to_string(),
        declaring_type: owner.clone(),
        params: params.to_vec(),
        return_type: return_type.cloned(),
        flags,
    })
}

/// An opcode followed by a little-endian metadata token.
pub fn with_token(opcode: u8, token: Token) -> Vec<u8> {
    let mut bytes = vec![opcode];
    bytes.extend_from_slice(&token.value().to_le_bytes());
    bytes
}

/// Concatenate IL fragments.
pub fn il(parts: &[&[u8]]) -> Vec<u8> {
    parts.concat()
}

pub struct Host {
    pub int32: CilTypeRc,
    pub int64: CilTypeRc,
    pub object: CilTypeRc,
    pub namespace: CilTypeRc,
    pub widget: CilTypeRc,
    pub payload: CilTypeRc,
    pub template_type: CilTypeRc,
    pub callback_type: CilTypeRc,
    /// Template closure field holding the namespace instance
    pub surrogate: FieldRc,
    /// Template closure field referencing the callback closure
    pub outer: FieldRc,
    pub get: MethodRc,
    pub set: MethodRc,
    pub reference: MethodRc,
    /// `void Call(object target, object arg)`
    pub call: MethodRc,
    /// `Widget::Count`, instance Int32
    pub count: FieldRc,
    /// `Widget::Log(int)`, static void
    pub log: MethodRc,
    /// `Widget::Consume(Payload)`, static void
    pub consume: MethodRc,
    pub runtime: AccessorRuntime,
    pub symbols: SymbolTable,
}

impl Host {
    pub fn new() -> Self {
        let int32 = value_type(1, "System", "Int32");
        let int64 = value_type(2, "System", "Int64");
        let object = class(3, "System", "Object", "System.Runtime");
        let namespace = class(10, "Templating", "EmitTemplateSurrogate", "Templating");
        let widget = class(11, "Demo", "Widget", "Demo");
        let payload = class(12, "Demo", "Payload", "Demo");
        let callback_type = class(13, "Demo", "<>c__DisplayClass0_0", TEMPLATE_ASSEMBLY);
        let template_type = class(14, "Demo", "<>c__DisplayClass0_1", TEMPLATE_ASSEMBLY);
        let table_type = class(15, "Templating", "CaptureTable", "Templating");
        let interlocked = class(16, "System.Threading", "Interlocked", "System.Runtime");

        let public = FieldAttributes::PUBLIC;
        let instance = MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG;
        let static_method = instance | MethodAttributes::STATIC;

        let surrogate = field(1, "s", &template_type, &namespace, public);
        let outer = field(2, "CS$<>8__locals1", &template_type, &callback_type, public);
        let count = field(3, "Count", &widget, &int32, public);

        let get = method(1, "Get", &namespace, &[object.clone()], Some(&int32), instance);
        let set = method(2, "Set", &namespace, &[object.clone(), int32.clone()], None, instance);
        let reference = method(3, "Ref", &namespace, &[object.clone()], Some(&int32), instance);
        let call = method(4, "Call", &namespace, &[object.clone(), object.clone()], None, instance);
        let log = method(5, "Log", &widget, &[int32.clone()], None, static_method);
        let consume = method(6, "Consume", &widget, &[payload.clone()], None, static_method);

        let runtime = AccessorRuntime {
            flag_type: int32.clone(),
            object_type: object.clone(),
            take_method: method(7, "Take", &table_type, &[int64.clone()], Some(&object), static_method),
            claim_method: method(
                8,
                "CompareExchange",
                &interlocked,
                &[int32.clone(), int32.clone(), int32.clone()],
                Some(&int32),
                static_method,
            ),
        };

        let mut symbols = SymbolTable::new();
        for ty in [&int32, &int64, &object, &namespace, &widget, &payload] {
            symbols.insert_type(ty.clone());
        }
        for f in [&surrogate, &outer, &count] {
            symbols.insert_field(f.clone());
        }
        for m in [&get, &set, &reference, &call, &log, &consume] {
            symbols.insert_method(m.clone());
        }

        Host {
            int32,
            int64,
            object,
            namespace,
            widget,
            payload,
            template_type,
            callback_type,
            surrogate,
            outer,
            get,
            set,
            reference,
            call,
            count,
            log,
            consume,
            runtime,
            symbols,
        }
    }

    /// Declare a field of the callback closure and make it resolvable.
    pub fn callback_field(&mut self, row: u32, name: &str, ty: &CilTypeRc) -> FieldRc {
        let f = field(row, name, &self.callback_type, ty, FieldAttributes::PUBLIC);
        self.symbols.insert_field(f.clone());
        f
    }

    /// Closures with the namespace surrogate, the callback reference and `captures`.
    pub fn captures(&self, captures: Vec<(FieldRc, CapturedValue)>) -> CaptureContext {
        let callback = captures
            .into_iter()
            .fold(Closure::new(self.callback_type.clone()), |closure, (f, value)| {
                closure.with_field(f, value)
            });
        let template = Closure::new(self.template_type.clone())
            .with_field(self.surrogate.clone(), CapturedValue::Null)
            .with_field(self.outer.clone(), CapturedValue::Null);

        CaptureContext::new(Some(Arc::new(template)), Some(Arc::new(callback)))
    }

    /// `ldarg.0; ldfld s`
    pub fn access(&self) -> Vec<u8> {
        il(&[&[0x02], &with_token(0x7B, self.surrogate.token)])
    }

    /// `ldarg.0; ldfld outer; ldfld <captured>`
    pub fn capture(&self, captured: &FieldRc) -> Vec<u8> {
        il(&[
            &[0x02],
            &with_token(0x7B, self.outer.token),
            &with_token(0x7B, captured.token),
        ])
    }

    /// `callvirt <placeholder>`
    pub fn invoke(&self, placeholder: &MethodRc) -> Vec<u8> {
        with_token(0x6F, placeholder.token)
    }
}

/// A type under construction that keeps everything defined on it.
pub struct DynamicType {
    pub assembly: String,
    pub declaring_type: CilTypeRc,
    pub fields: Vec<FieldRc>,
    pub methods: Vec<(MethodRc, MethodBody)>,
    pub grants: Vec<String>,
}

impl DynamicType {
    pub fn new() -> Self {
        DynamicType {
            assembly: "Dynamic".to_string(),
            declaring_type: class(100, "", "<>Generated", "Dynamic"),
            fields: Vec::new(),
            methods: Vec::new(),
            grants: Vec::new(),
        }
    }
}

impl TypeUnderConstruction for DynamicType {
    fn assembly_name(&self) -> &str {
        &self.assembly
    }

    fn define_hidden_static_field(&mut self, name: &str, field_type: &CilTypeRc) -> Result<FieldRc> {
        let row = 0x100 + self.fields.len() as u32;
        let f = field(
            row,
            name,
            &self.declaring_type,
            field_type,
            FieldAttributes::PRIVATE | FieldAttributes::STATIC,
        );
        self.fields.push(f.clone());
        Ok(f)
    }

    fn define_hidden_static_method(
        &mut self,
        name: &str,
        return_type: &CilTypeRc,
        body: MethodBody,
    ) -> Result<MethodRc> {
        let row = 0x100 + self.methods.len() as u32;
        let m = method(
            row,
            name,
            &self.declaring_type,
            &[],
            Some(return_type),
            MethodAttributes::PRIVATE | MethodAttributes::STATIC,
        );
        self.methods.push((m.clone(), body));
        Ok(m)
    }

    fn grants_access_to(&self, assembly: &str) -> bool {
        self.grants.iter().any(|granted| granted == assembly)
    }

    fn grant_access_to(&mut self, assembly: &str) -> Result<()> {
        self.grants.push(assembly.to_string());
        Ok(())
    }
}

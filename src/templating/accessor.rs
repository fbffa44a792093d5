//! Hidden static accessors for captured objects.
//!
//! A captured object that has no literal form is parked in a [`CaptureTable`] and replaced by
//! a call to a generated static accessor on the type under construction. The accessor owns
//! three hidden static fields: the cached value, a claim flag and a ready flag. Its body
//! claims the flag with a compare-and-exchange, so only the first caller takes the object out
//! of the table; concurrent callers spin until the ready flag is published.
//!
//! ```text
//!         volatile. ldsfld   ready
//!         brtrue             READY
//!         ldsflda            claimed
//!         ldc.i4.1
//!         ldc.i4.0
//!         call               claim(ref int32, int32, int32)
//!         brtrue             WAIT
//!         ldc.i8             <key>
//!         call               take(int64)
//!         castclass | unbox.any <type>
//!         stsfld             cache
//!         ldc.i4.1
//!         volatile. stsfld   ready
//!         br                 READY
//! WAIT:   volatile. ldsfld   ready
//!         brfalse            WAIT
//! READY:  ldsfld             cache
//!         ret
//! ```

use crate::{
    assembly::{opcodes, BranchCondition, Immediate, Instruction, Label, MethodBody, Operand},
    metadata::{CilTypeRc, FieldRc, MethodRc},
    templating::{capture::CapturedObject, table::CaptureTable},
    Result,
};

/// The type a template expands into.
///
/// Only the object materialization path touches it: it adds hidden static members and grants
/// the generated code access to the assemblies of captured object types.
pub trait TypeUnderConstruction {
    /// Name of the assembly the type is being built in.
    fn assembly_name(&self) -> &str;

    /// Add a compiler-hidden static field.
    ///
    /// # Errors
    /// Returns an error if the host can not add the field.
    fn define_hidden_static_field(&mut self, name: &str, field_type: &CilTypeRc) -> Result<FieldRc>;

    /// Add a compiler-hidden static, parameterless method with the given body.
    ///
    /// # Errors
    /// Returns an error if the host can not add the method.
    fn define_hidden_static_method(
        &mut self,
        name: &str,
        return_type: &CilTypeRc,
        body: MethodBody,
    ) -> Result<MethodRc>;

    /// Returns `true` if code in the type may already access non-public members of `assembly`.
    fn grants_access_to(&self, assembly: &str) -> bool;

    /// Let code in the type access non-public members of `assembly`.
    ///
    /// # Errors
    /// Returns an error if the host can not add the grant.
    fn grant_access_to(&mut self, assembly: &str) -> Result<()>;
}

/// Host identities referenced from generated accessor bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessorRuntime {
    /// Type of the claim and ready flags (`System.Int32`)
    pub flag_type: CilTypeRc,
    /// Type returned by `take_method` (`System.Object`)
    pub object_type: CilTypeRc,
    /// Static `object Take(long key)` removing an entry from the capture table
    pub take_method: MethodRc,
    /// Static `int CompareExchange(ref int, int value, int comparand)`
    pub claim_method: MethodRc,
}

/// The members generated for one captured object.
#[derive(Debug, Clone)]
pub struct CapturedAccessor {
    /// Capture table key the accessor consumes
    pub key: u64,
    /// The static accessor method
    pub method: MethodRc,
    /// Cached value
    pub cache: FieldRc,
    /// Set once the first caller claimed the table entry
    pub claimed: FieldRc,
    /// Set once `cache` holds the value
    pub ready: FieldRc,
}

/// Park `object` in `table` and generate the accessor returning it.
///
/// The object's assembly is granted access once if it differs from the type's own assembly.
/// The table entry is only inserted after every member was defined.
///
/// # Errors
/// Returns errors from the builder, or [`crate::Error::CaptureKeyCollision`] /
/// [`crate::Error::LockError`] from the table.
pub fn define_accessor<B: TypeUnderConstruction + ?Sized>(
    builder: &mut B,
    runtime: &AccessorRuntime,
    table: &CaptureTable,
    object: CapturedObject,
) -> Result<CapturedAccessor> {
    let key = CaptureTable::next_key();
    let object_type = object.object_type().clone();

    if object_type.assembly != builder.assembly_name() && !builder.grants_access_to(&object_type.assembly)
    {
        builder.grant_access_to(&object_type.assembly)?;
    }

    let cache = builder.define_hidden_static_field(&format!("<>capture_{key}"), &object_type)?;
    let claimed = builder
        .define_hidden_static_field(&format!("<>capture_{key}_claimed"), &runtime.flag_type)?;
    let ready =
        builder.define_hidden_static_field(&format!("<>capture_{key}_ready"), &runtime.flag_type)?;

    let body = accessor_body(runtime, key, &object_type, &cache, &claimed, &ready);
    let method =
        builder.define_hidden_static_method(&format!("<>get_capture_{key}"), &object_type, body)?;

    table.insert(key, object)?;
    log::debug!("generated capture accessor {method} for key {key}");

    Ok(CapturedAccessor {
        key,
        method,
        cache,
        claimed,
        ready,
    })
}

/// The claim-once body of a capture accessor.
#[must_use]
pub fn accessor_body(
    runtime: &AccessorRuntime,
    key: u64,
    object_type: &CilTypeRc,
    cache: &FieldRc,
    claimed: &FieldRc,
    ready: &FieldRc,
) -> MethodBody {
    let wait = Label::new("Wait");
    let done = Label::new("Ready");
    let unpack = if object_type.is_value_type() {
        opcodes::UNBOX_ANY
    } else {
        opcodes::CASTCLASS
    };

    let mut body = MethodBody::new();
    body.push(Instruction::raw(opcodes::VOLATILE));
    body.push(Instruction::LoadStaticField(ready.clone()));
    body.push(Instruction::Branch {
        label: done.clone(),
        condition: BranchCondition::True,
    });

    body.push(Instruction::LoadStaticFieldAddress(claimed.clone()));
    body.push(Instruction::load_i4(1));
    body.push(Instruction::load_i4(0));
    body.push(Instruction::Call(runtime.claim_method.clone()));
    body.push(Instruction::Branch {
        label: wait.clone(),
        condition: BranchCondition::True,
    });

    body.push(Instruction::raw_with(
        opcodes::LDC_I8,
        Operand::Immediate(Immediate::Int64(i64::from_ne_bytes(key.to_ne_bytes()))),
    ));
    body.push(Instruction::Call(runtime.take_method.clone()));
    body.push(Instruction::raw_with(unpack, Operand::Type(object_type.clone())));
    body.push(Instruction::StoreStaticField(cache.clone()));
    body.push(Instruction::load_i4(1));
    body.push(Instruction::raw(opcodes::VOLATILE));
    body.push(Instruction::StoreStaticField(ready.clone()));
    body.push(Instruction::Branch {
        label: done.clone(),
        condition: BranchCondition::Always,
    });

    body.mark(wait.clone());
    body.push(Instruction::raw(opcodes::VOLATILE));
    body.push(Instruction::LoadStaticField(ready.clone()));
    body.push(Instruction::Branch {
        label: wait,
        condition: BranchCondition::False,
    });

    body.mark(done);
    body.push(Instruction::LoadStaticField(cache.clone()));
    body.push(Instruction::Return);
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{encode_body, BytecodeEmitter, CilToken, EncoderOptions},
        metadata::TypeFlavor,
        test::{accessor_runtime, create_type, TestTypeBuilder},
    };

    #[test]
    fn defines_members_and_parks_object() {
        let table = CaptureTable::new();
        let runtime = accessor_runtime();
        let mut builder = TestTypeBuilder::new("Dynamic");
        let payload = create_type(30, "Demo", "Payload");

        let accessor = define_accessor(
            &mut builder,
            &runtime,
            &table,
            CapturedObject::new(payload.clone(), String::from("state")),
        )
        .unwrap();

        assert!(table.contains(accessor.key).unwrap());
        assert_eq!(table.len().unwrap(), 1);
        assert_eq!(builder.fields.len(), 3);
        assert_eq!(builder.methods.len(), 1);
        assert_eq!(accessor.cache.field_type, payload);
        assert_eq!(accessor.ready.field_type, runtime.flag_type);
        assert_eq!(accessor.method.return_type.as_ref(), Some(&payload));
        assert!(accessor.method.is_static());
        assert_eq!(builder.grants, vec!["Demo".to_string()]);

        let object = table.take(accessor.key).unwrap();
        assert_eq!(object.downcast_ref::<String>().map(String::as_str), Some("state"));
        assert!(table.is_empty().unwrap());
    }

    #[test]
    fn grants_each_assembly_once() {
        let table = CaptureTable::new();
        let runtime = accessor_runtime();
        let mut builder = TestTypeBuilder::new("Dynamic");
        let payload = create_type(30, "Demo", "Payload");

        for _ in 0..3 {
            define_accessor(&mut builder, &runtime, &table, CapturedObject::new(payload.clone(), 1u8))
                .unwrap();
        }
        assert_eq!(builder.grants.len(), 1);
        assert_eq!(table.len().unwrap(), 3);

        let mut local = TestTypeBuilder::new("Demo");
        define_accessor(&mut local, &runtime, &table, CapturedObject::new(payload, 1u8)).unwrap();
        assert!(local.grants.is_empty());
    }

    #[test]
    fn value_types_are_unboxed() {
        let runtime = accessor_runtime();
        let mut builder = TestTypeBuilder::new("Dynamic");
        let point = std::sync::Arc::new(
            (*create_type(31, "Demo", "Point"))
                .clone()
                .with_flavor(TypeFlavor::ValueType),
        );
        let cache = builder.define_hidden_static_field("c", &point).unwrap();
        let flag = builder.define_hidden_static_field("f", &runtime.flag_type).unwrap();

        let body = accessor_body(&runtime, 9, &point, &cache, &flag, &flag);
        let unpack = body
            .instructions()
            .find_map(|instruction| match instruction {
                Instruction::Raw {
                    opcode,
                    operand: Operand::Type(ty),
                } if *ty == point => Some(*opcode),
                _ => None,
            })
            .unwrap();
        assert_eq!(unpack, opcodes::UNBOX_ANY);
    }

    #[test]
    fn body_encodes_balanced() {
        let runtime = accessor_runtime();
        let mut builder = TestTypeBuilder::new("Dynamic");
        let payload = create_type(30, "Demo", "Payload");
        let cache = builder.define_hidden_static_field("c", &payload).unwrap();
        let claimed = builder.define_hidden_static_field("k", &runtime.flag_type).unwrap();
        let ready = builder.define_hidden_static_field("r", &runtime.flag_type).unwrap();

        let body = accessor_body(&runtime, 0x1234, &payload, &cache, &claimed, &ready);
        assert_eq!(body.labels().count(), 2);
        assert!(matches!(body.tokens.last(), Some(CilToken::Instruction(Instruction::Return))));

        let mut emitter = BytecodeEmitter::new();
        encode_body(&body, &mut emitter, EncoderOptions { log_level: None }).unwrap();
        let emitted = emitter.finish().unwrap();
        assert_eq!(emitted.max_stack, 3);
        assert_eq!(emitted.code.last(), Some(&0x2A));
    }
}

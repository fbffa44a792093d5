//! End-to-end template processing: decode, expand, encode.

use crate::{
    assembly::{
        decode_body, CodeSink, Encoder, EncoderOptions, Local, LocalDecl, LocalSlot, MethodBody,
    },
    metadata::{CilTypeRc, GenericContext, SymbolResolver},
    templating::{
        accessor::{AccessorRuntime, TypeUnderConstruction},
        capture::CaptureContext,
        expander::{argument_offset, ExpanderOptions, MacroExpander},
        table::CaptureTable,
    },
    Result,
};

/// The compiled template to expand.
#[derive(Debug, Clone, Default)]
pub struct TemplateMethod {
    /// Raw IL of the template body
    pub code: Vec<u8>,
    /// Declared locals of the template body
    pub locals: Vec<LocalDecl>,
    /// The template has no receiver
    pub is_static: bool,
    /// Generic instantiation the template's tokens resolve under
    pub generic_context: GenericContext,
}

impl TemplateMethod {
    /// A template without locals or generic arguments.
    #[must_use]
    pub fn new(code: Vec<u8>, is_static: bool) -> Self {
        TemplateMethod {
            code,
            is_static,
            ..TemplateMethod::default()
        }
    }

    /// Set the declared locals.
    #[must_use]
    pub fn with_locals(mut self, locals: Vec<LocalDecl>) -> Self {
        self.locals = locals;
        self
    }

    /// Set the generic context.
    #[must_use]
    pub fn with_generic_context(mut self, context: GenericContext) -> Self {
        self.generic_context = context;
        self
    }
}

/// Per-destination settings of a [`TemplateProcessor`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateOptions {
    /// The destination method has no receiver
    pub destination_is_static: bool,
    /// Drop the template's final `ret`
    pub trim_trailing_return: bool,
    /// Options of the final encoding step
    pub encoder: EncoderOptions,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        TemplateOptions {
            destination_is_static: false,
            trim_trailing_return: true,
            encoder: EncoderOptions::default(),
        }
    }
}

/// Drives a template through decoding, macro expansion and encoding.
///
/// The processor holds what stays fixed across templates: the token resolver, the placeholder
/// namespace, the accessor runtime identities and the capture table. Everything that varies
/// per expansion (template, captures, destination) is passed to [`TemplateProcessor::process`].
pub struct TemplateProcessor<'a, R: SymbolResolver + ?Sized> {
    resolver: &'a R,
    namespace: CilTypeRc,
    runtime: &'a AccessorRuntime,
    table: &'a CaptureTable,
}

impl<'a, R: SymbolResolver + ?Sized> TemplateProcessor<'a, R> {
    /// Create a processor parking captured objects in [`CaptureTable::global`].
    ///
    /// ## Arguments
    /// * `resolver` - Resolves the metadata tokens embedded in template bodies
    /// * `namespace` - The type declaring the placeholder operations
    /// * `runtime` - Host identities used by generated accessors
    pub fn new(resolver: &'a R, namespace: CilTypeRc, runtime: &'a AccessorRuntime) -> Self {
        TemplateProcessor {
            resolver,
            namespace,
            runtime,
            table: CaptureTable::global(),
        }
    }

    /// Use `table` instead of the process-wide capture table.
    #[must_use]
    pub fn with_table(mut self, table: &'a CaptureTable) -> Self {
        self.table = table;
        self
    }

    /// Argument index shift between a template and its destination.
    #[must_use]
    pub fn arg_offset(template_is_static: bool, destination_is_static: bool) -> i32 {
        argument_offset(template_is_static, destination_is_static)
    }

    /// Decode `template` and expand its placeholders.
    ///
    /// # Errors
    /// Returns decoding errors or the structural error that aborted expansion.
    pub fn expand<B: TypeUnderConstruction + ?Sized>(
        &self,
        template: &TemplateMethod,
        captures: &CaptureContext,
        builder: &mut B,
        options: &TemplateOptions,
    ) -> Result<MethodBody> {
        self.expand_template(template, captures, builder, options)
            .map(|(body, _)| body)
    }

    fn expand_template<B: TypeUnderConstruction + ?Sized>(
        &self,
        template: &TemplateMethod,
        captures: &CaptureContext,
        builder: &mut B,
        options: &TemplateOptions,
    ) -> Result<(MethodBody, Vec<u64>)> {
        let mut body = decode_body(
            &template.code,
            &template.locals,
            self.resolver,
            &template.generic_context,
        )?;
        let decoded = body.tokens.len();

        let expander_options = ExpanderOptions {
            arg_offset: argument_offset(template.is_static, options.destination_is_static),
            template_is_static: template.is_static,
            destination_is_static: options.destination_is_static,
            trim_trailing_return: options.trim_trailing_return,
        };
        let mut expander =
            MacroExpander::new(captures, self.namespace.clone(), builder, self.runtime, self.table)
                .with_options(expander_options);
        expander.expand(&mut body)?;
        let keys = expander.accessors().iter().map(|accessor| accessor.key).collect();

        log::debug!(
            "expanded template of {} bytes: {decoded} tokens -> {} tokens, {} locals",
            template.code.len(),
            body.tokens.len(),
            body.locals.len()
        );
        Ok((body, keys))
    }

    /// Expand `template` and encode the result into `sink`.
    ///
    /// `bound_locals` maps locals the template captured onto slots `sink` already declared
    /// for the destination method. Returns the expanded body that was encoded.
    ///
    /// # Errors
    /// Returns decoding, expansion or encoding errors. Nothing is emitted into `sink` unless
    /// the expanded body is encodable, and a rejected body withdraws its captured objects
    /// from the capture table.
    pub fn process<B, S>(
        &self,
        template: &TemplateMethod,
        captures: &CaptureContext,
        builder: &mut B,
        sink: &mut S,
        bound_locals: &[(Local, LocalSlot)],
        options: &TemplateOptions,
    ) -> Result<MethodBody>
    where
        B: TypeUnderConstruction + ?Sized,
        S: CodeSink + ?Sized,
    {
        let (body, keys) = self.expand_template(template, captures, builder, options)?;

        let mut encoder = Encoder::with_options(sink, options.encoder);
        for (local, slot) in bound_locals {
            encoder.bind_local(local, *slot);
        }
        if let Err(error) = encoder.encode(&body) {
            for key in keys {
                if let Err(rollback) = self.table.take(key) {
                    log::warn!("could not withdraw capture {key}: {rollback}");
                }
            }
            return Err(error);
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{opcodes, BytecodeEmitter, EmitOperand},
        metadata::SymbolTable,
        templating::{CapturedValue, MemberDescriptor},
        test::{Recorded, RecordingSink, TemplateFixture, TestTypeBuilder},
        Error,
    };

    fn with_token(opcode: u8, token: u32) -> Vec<u8> {
        let mut bytes = vec![opcode];
        bytes.extend_from_slice(&token.to_le_bytes());
        bytes
    }

    fn symbols(fixture: &TemplateFixture) -> SymbolTable {
        let mut symbols = SymbolTable::new();
        symbols.insert_field(fixture.surrogate.clone());
        symbols.insert_field(fixture.outer.clone());
        symbols.insert_field(fixture.count.clone());
        symbols.insert_method(fixture.get.clone());
        symbols.insert_method(fixture.set.clone());
        symbols
    }

    #[test]
    fn offsets() {
        assert_eq!(TemplateProcessor::<SymbolTable>::arg_offset(true, false), 1);
        assert_eq!(TemplateProcessor::<SymbolTable>::arg_offset(false, true), -1);
    }

    #[test]
    fn decodes_expands_and_encodes() {
        let fixture = TemplateFixture::new();
        let target = fixture.callback_field(10, "field", &fixture.object);
        let mut symbols = symbols(&fixture);
        symbols.insert_field(target.clone());
        let context = fixture.context(&[(
            target.clone(),
            CapturedValue::Member(MemberDescriptor::Field(fixture.count.clone())),
        )]);

        // ldarg.0; ldfld s; ldarg.0; ldfld outer; ldfld field; callvirt Get; pop; ret
        let mut code = vec![0x02];
        code.extend(with_token(0x7B, fixture.surrogate.token.value()));
        code.push(0x02);
        code.extend(with_token(0x7B, fixture.outer.token.value()));
        code.extend(with_token(0x7B, target.token.value()));
        code.extend(with_token(0x6F, fixture.get.token.value()));
        code.extend([0x26, 0x2A]);

        let table = CaptureTable::new();
        let processor =
            TemplateProcessor::new(&symbols, fixture.namespace.clone(), &fixture.runtime)
                .with_table(&table);
        let mut builder = TestTypeBuilder::new("Dynamic");
        let mut sink = RecordingSink::default();
        let options = TemplateOptions {
            encoder: EncoderOptions { log_level: None },
            ..TemplateOptions::default()
        };

        processor
            .process(
                &TemplateMethod::new(code, false),
                &context,
                &mut builder,
                &mut sink,
                &[],
                &options,
            )
            .unwrap();

        assert_eq!(
            sink.emitted,
            vec![
                Recorded::op(opcodes::LDARG_0),
                Recorded::with(opcodes::LDFLD, EmitOperand::Field(fixture.count.clone())),
                Recorded::op(opcodes::POP),
            ]
        );
        assert!(builder.fields.is_empty());
    }

    #[test]
    fn static_template_into_instance_destination() {
        let fixture = TemplateFixture::new();
        let symbols = symbols(&fixture);
        let table = CaptureTable::new();
        let processor =
            TemplateProcessor::new(&symbols, fixture.namespace.clone(), &fixture.runtime)
                .with_table(&table);
        let mut builder = TestTypeBuilder::new("Dynamic");

        let template = TemplateMethod::new(vec![0x02, 0x03, 0x58, 0x2A], true);
        let mut emitter = BytecodeEmitter::new();
        let options = TemplateOptions {
            trim_trailing_return: false,
            ..TemplateOptions::default()
        };
        processor
            .process(
                &template,
                &CaptureContext::default(),
                &mut builder,
                &mut emitter,
                &[],
                &options,
            )
            .unwrap();

        // ldarg.1; ldarg.2; add; ret
        assert_eq!(emitter.finish().unwrap().code, vec![0x03, 0x04, 0x58, 0x2A]);
    }

    #[test]
    fn failed_expansion_emits_nothing() {
        let fixture = TemplateFixture::new();
        let symbols = symbols(&fixture);
        let table = CaptureTable::new();
        let processor =
            TemplateProcessor::new(&symbols, fixture.namespace.clone(), &fixture.runtime)
                .with_table(&table);
        let mut builder = TestTypeBuilder::new("Dynamic");
        let mut sink = RecordingSink::default();

        // ldarg.1 of an instance template is ldarg.0 of a static destination
        let result = processor.process(
            &TemplateMethod::new(vec![0x03, 0x2A], false),
            &fixture.context(&[]),
            &mut builder,
            &mut sink,
            &[],
            &TemplateOptions {
                destination_is_static: true,
                ..TemplateOptions::default()
            },
        );
        assert_eq!(result.unwrap().tokens.len(), 1);

        // ldarg.s 0 reads the receiver without reaching a capture
        let result = processor.process(
            &TemplateMethod::new(vec![0x0E, 0x00, 0x2A], false),
            &fixture.context(&[]),
            &mut builder,
            &mut sink,
            &[],
            &TemplateOptions {
                destination_is_static: true,
                ..TemplateOptions::default()
            },
        );
        assert!(matches!(result, Err(Error::UnresolvableCapture(_))));
        assert_eq!(sink.emitted.len(), 1);
    }
}

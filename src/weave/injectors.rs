//! Code generation for each kind of patch

use super::call::{build_call, validate_signature, SignatureError, SyntheticArgument};
use super::{Error, InjectorKind, PatchDefinition};
use crate::vm::{
    runtime, Block, Code, Constant, FieldType, Instruction, InvokeType, LabelGenerator, MethodRef,
};
use thiserror::Error;

/// Why a patch cannot apply to a method or an instruction
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("the method has no body")]
    NoBody,

    #[error("`{0}` does not push a constant")]
    NotAConstant(String),

    #[error("`{0}` is not a method call")]
    NotAnInvoke(String),

    #[error("the type of the value pushed by `{0}` is unknown")]
    UnknownValueType(String),

    #[error("the abstract injector kind generates no code")]
    AbstractKind,
}

/// Return type and synthetic argument types a patch body must declare
struct Expectation {
    return_type: Option<FieldType>,
    synthetic: Vec<FieldType>,
}

fn callback_type(target: &MethodRef) -> FieldType {
    FieldType::object(runtime::callback_class(target.return_type().is_some()))
}

/// Types of the receiver (if any) and arguments of a call, in stack order
fn call_arguments(callee: &MethodRef) -> Vec<FieldType> {
    (0..callee.argument_count())
        .filter_map(|idx| callee.argument_type(idx))
        .collect()
}

fn pushed_constant(instruction: &Instruction) -> Result<&Constant, Rejection> {
    match instruction {
        Instruction::Push(constant) if *constant != Constant::Null => Ok(constant),
        other => Err(Rejection::NotAConstant(other.to_string())),
    }
}

fn pushed_value(
    target: &MethodRef,
    locals: &[FieldType],
    instruction: &Instruction,
) -> Result<FieldType, Rejection> {
    if instruction.stack_effect().push != 1 {
        return Err(Rejection::UnknownValueType(instruction.to_string()));
    }
    instruction
        .pushed_type(target, locals)
        .ok_or_else(|| Rejection::UnknownValueType(instruction.to_string()))
}

fn expectation(
    kind: &InjectorKind,
    target: &MethodRef,
    locals: &[FieldType],
    instruction: &Instruction,
) -> Result<Expectation, Rejection> {
    match kind {
        InjectorKind::Injector => Err(Rejection::AbstractKind),
        InjectorKind::Inject { .. } => Ok(Expectation {
            return_type: None,
            synthetic: vec![callback_type(target)],
        }),
        InjectorKind::ModifyConstant { .. } => {
            let typ = pushed_constant(instruction)?.field_type();
            Ok(Expectation {
                return_type: Some(typ.clone()),
                synthetic: vec![typ],
            })
        }
        InjectorKind::Redirect => match instruction {
            Instruction::Invoke(_, callee) => Ok(Expectation {
                return_type: callee.return_type().cloned(),
                synthetic: call_arguments(callee),
            }),
            other => Err(Rejection::NotAnInvoke(other.to_string())),
        },
        InjectorKind::ModifyValue => {
            let typ = pushed_value(target, locals, instruction)?;
            Ok(Expectation {
                return_type: Some(typ.clone()),
                synthetic: vec![typ],
            })
        }
    }
}

/// Check a patch against a target method, before looking at any instruction
pub fn validate_method(patch: &PatchDefinition, target: &MethodRef) -> Result<(), Rejection> {
    match patch.kind() {
        InjectorKind::Inject { .. } => {
            validate_signature(target, &patch.body, None, &[callback_type(target)])?;
            Ok(())
        }
        InjectorKind::Injector => Err(Rejection::AbstractKind),
        // These depend on the selected instruction
        InjectorKind::ModifyConstant { .. }
        | InjectorKind::Redirect
        | InjectorKind::ModifyValue => Ok(()),
    }
}

/// Check a patch against the instruction at `offset` of the target method
pub fn validate_instruction(
    patch: &PatchDefinition,
    target: &MethodRef,
    code: &Code,
    offset: usize,
) -> Result<(), Rejection> {
    if let InjectorKind::Inject { .. } = patch.kind() {
        return Ok(());
    }
    let instruction = match code.get(offset) {
        Some(entry) => &entry.instruction,
        None => return Err(Rejection::NoBody),
    };
    let expected = expectation(patch.kind(), target, &code.locals, instruction)?;
    validate_signature(
        target,
        &patch.body,
        expected.return_type.as_ref(),
        &expected.synthetic,
    )?;
    Ok(())
}

/// The instruction a set of patches applies to
pub struct Site<'a> {
    pub method: &'a MethodRef,
    pub instruction: &'a Instruction,

    /// Stack depth just before the instruction
    pub depth: usize,
}

/// Emits the patch calls for one site
///
/// Every `Inject` at a site shares one local for its callback object.
#[derive(Debug, Default)]
pub struct SiteProcessor {
    callback_local: Option<u16>,
}

impl SiteProcessor {
    pub fn new() -> SiteProcessor {
        SiteProcessor::default()
    }

    /// Append the code calling `patch` (whose copy on the target class is `remapped`)
    pub fn emit(
        &mut self,
        patch: &PatchDefinition,
        site: &Site,
        remapped: &MethodRef,
        code: &mut Code,
        block: &mut Block,
    ) -> Result<(), Error> {
        let invalid = |reason: Rejection| Error::InvalidSite {
            patch: patch.describe(),
            method: site.method.to_string(),
            reason: reason.to_string(),
        };

        match patch.kind() {
            InjectorKind::Inject { cancellable, .. } => {
                self.emit_inject(*cancellable, site, remapped, code, block)?;
            }
            InjectorKind::ModifyConstant { .. } => {
                let constant = pushed_constant(site.instruction).map_err(invalid)?;
                let argument = SyntheticArgument::new(
                    constant.field_type(),
                    vec![Instruction::Push(constant.clone())],
                );
                build_call(block, site.method, remapped, &[argument]);
            }
            InjectorKind::Redirect => {
                let callee = match site.instruction {
                    Instruction::Invoke(_, callee) => callee,
                    other => return Err(invalid(Rejection::NotAnInvoke(other.to_string()))),
                };
                let arguments = spill(call_arguments(callee), remapped, code, block);
                build_call(block, site.method, remapped, &arguments);
            }
            InjectorKind::ModifyValue => {
                let typ =
                    pushed_value(site.method, &code.locals, site.instruction).map_err(invalid)?;
                let arguments = spill(vec![typ], remapped, code, block);
                build_call(block, site.method, remapped, &arguments);
            }
            InjectorKind::Injector => return Err(invalid(Rejection::AbstractKind)),
        }
        Ok(())
    }

    /// Create a callback, call the patch with it, and return early if the patch cancelled
    ///
    /// ```text
    ///     push cancellable
    ///     new CallbackInfo.<init>(Z)V
    ///     stloc cb
    ///     <call patch with cb>
    ///     ldloc cb                          ; only when cancellable
    ///     callvirt CallbackInfo.isCancelled()Z
    ///     brfalse fin
    ///     pop * depth
    ///     ldloc cb                          ; only for non-void methods
    ///     callvirt CallbackInfoReturn.getReturnValue()
    ///     checkcast <return type>
    ///     ret
    /// fin:
    ///     nop
    /// ```
    fn emit_inject(
        &mut self,
        cancellable: bool,
        site: &Site,
        remapped: &MethodRef,
        code: &mut Code,
        block: &mut Block,
    ) -> Result<(), Error> {
        let return_type = site.method.return_type().cloned();
        let callback_type = callback_type(site.method);
        let local = match self.callback_local {
            Some(local) => local,
            None => {
                let local = code.allocate_local(callback_type.clone());
                self.callback_local = Some(local);
                local
            }
        };

        block.push(Instruction::Push(Constant::Int(i32::from(cancellable))));
        block.push(Instruction::New(runtime::callback_constructor(
            return_type.is_some(),
        )));
        block.push(Instruction::StoreLocal(local));
        let argument = SyntheticArgument::new(callback_type, vec![Instruction::LoadLocal(local)]);
        build_call(block, site.method, remapped, &[argument]);

        if cancellable {
            let fin = code.fresh_label();
            block.push(Instruction::LoadLocal(local));
            block.push(Instruction::Invoke(
                InvokeType::Virtual,
                runtime::is_cancelled(),
            ));
            block.push(Instruction::BranchIf(false, fin));
            for _ in 0..site.depth {
                block.push(Instruction::Pop);
            }
            if let Some(return_type) = return_type {
                block.push(Instruction::LoadLocal(local));
                block.push(Instruction::Invoke(
                    InvokeType::Virtual,
                    runtime::get_return_value(),
                ));
                block.push(Instruction::CheckCast(return_type));
            }
            block.push(Instruction::Return);
            block.place_label(fin)?;
            block.push(Instruction::Nop);
        }
        Ok(())
    }
}

/// Synthetic arguments for values already on the stack
///
/// Instance patches need their receiver beneath those values, so the values are moved into fresh
/// locals first and reloaded after the receiver.
fn spill(
    types: Vec<FieldType>,
    remapped: &MethodRef,
    code: &mut Code,
    block: &mut Block,
) -> Vec<SyntheticArgument> {
    if remapped.is_static {
        return types.into_iter().map(SyntheticArgument::on_stack).collect();
    }
    let locals: Vec<u16> = types
        .iter()
        .map(|typ| code.allocate_local(typ.clone()))
        .collect();
    for local in locals.iter().rev() {
        block.push(Instruction::StoreLocal(*local));
    }
    types
        .into_iter()
        .zip(locals)
        .map(|(typ, local)| SyntheticArgument::new(typ, vec![Instruction::LoadLocal(local)]))
        .collect()
}

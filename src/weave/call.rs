use crate::vm::{Block, FieldType, Instruction, InvokeType, MethodRef};
use thiserror::Error;

/// An argument of a patch call that does not come from the target's own parameters
#[derive(Clone, Debug)]
pub struct SyntheticArgument {
    pub typ: FieldType,

    /// Instructions pushing the value (empty when it is already on the stack)
    pub load: Vec<Instruction>,
}

impl SyntheticArgument {
    pub fn new(typ: FieldType, load: Vec<Instruction>) -> SyntheticArgument {
        SyntheticArgument { typ, load }
    }

    /// Value that is already on the stack when the call starts
    pub fn on_stack(typ: FieldType) -> SyntheticArgument {
        SyntheticArgument { typ, load: vec![] }
    }
}

/// Why a patch body cannot be called from a target method
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("an instance patch cannot target a static method")]
    InstancePatchOnStaticTarget,

    #[error("patch returns {found} but {expected} is required")]
    ReturnType { expected: String, found: String },

    #[error("patch takes {found} parameters but needs at least {expected}")]
    MissingParameters { expected: usize, found: usize },

    #[error("patch takes {found} parameters but at most {max} are available")]
    TooManyParameters { max: usize, found: usize },

    #[error("patch parameter {index} is {found} but {expected} is required")]
    ParameterType {
        index: usize,
        expected: String,
        found: String,
    },
}

fn render(typ: Option<&FieldType>) -> String {
    typ.map_or_else(|| "V".to_owned(), |typ| typ.to_string())
}

/// Check that `body` can be called from `target` with the synthetic arguments
///
/// The body's parameters must be exactly the synthetic argument types, optionally followed by a
/// prefix of the target's own parameter types. No conversions are considered.
pub fn validate_signature(
    target: &MethodRef,
    body: &MethodRef,
    expected_return: Option<&FieldType>,
    synthetic: &[FieldType],
) -> Result<(), SignatureError> {
    if !body.is_static && target.is_static {
        return Err(SignatureError::InstancePatchOnStaticTarget);
    }

    if body.return_type() != expected_return {
        return Err(SignatureError::ReturnType {
            expected: render(expected_return),
            found: render(body.return_type()),
        });
    }

    let parameters = &body.descriptor.parameters;
    if parameters.len() < synthetic.len() {
        return Err(SignatureError::MissingParameters {
            expected: synthetic.len(),
            found: parameters.len(),
        });
    }
    let max = synthetic.len() + target.descriptor.parameters.len();
    if parameters.len() > max {
        return Err(SignatureError::TooManyParameters {
            max,
            found: parameters.len(),
        });
    }

    let expected_types = synthetic.iter().chain(&target.descriptor.parameters);
    for (index, (found, expected)) in parameters.iter().zip(expected_types).enumerate() {
        if found != expected {
            return Err(SignatureError::ParameterType {
                index,
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
    }
    Ok(())
}

/// Emit a call from `target` to the remapped patch body
///
/// Pushes the receiver (instance patches only), then the synthetic arguments, then as many of
/// the target's parameters as the patch declares.
pub fn build_call(
    block: &mut Block,
    target: &MethodRef,
    remapped: &MethodRef,
    synthetic: &[SyntheticArgument],
) {
    if !remapped.is_static {
        block.push(Instruction::LoadArg(0));
    }

    let arity = remapped.descriptor.parameters.len();
    let mut arg_index = 0;
    for argument in synthetic {
        block.push_all(argument.load.iter().cloned());
        arg_index += 1;
    }

    let receiver = usize::from(!target.is_static);
    for parameter in 0..target.descriptor.parameters.len() {
        if arg_index >= arity {
            break;
        }
        block.push(Instruction::LoadArg((parameter + receiver) as u16));
        arg_index += 1;
    }

    block.push(Instruction::Invoke(InvokeType::Direct, remapped.clone()));
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::{BinaryName, Code, MethodDescriptor, Name, Origin, UnqualifiedName};

    fn method(
        class: &str,
        params: Vec<FieldType>,
        ret: Option<FieldType>,
        is_static: bool,
    ) -> MethodRef {
        MethodRef::new(
            BinaryName::from_string(class.to_owned()).unwrap(),
            UnqualifiedName::from_string("m".to_owned()).unwrap(),
            MethodDescriptor::new(params, ret),
            is_static,
        )
    }

    fn callback() -> FieldType {
        FieldType::object(BinaryName::CALLBACKINFO)
    }

    #[test]
    fn accepts_prefixes_of_target_parameters() {
        let target = method("demo/T", vec![FieldType::boolean(), FieldType::int()], None, false);
        for count in 0..=2 {
            let mut params = vec![callback()];
            params.extend(target.descriptor.parameters[..count].iter().cloned());
            let body = method("demo/P", params, None, false);
            assert_eq!(validate_signature(&target, &body, None, &[callback()]), Ok(()));
        }
    }

    #[test]
    fn rejections() {
        let target = method("demo/T", vec![FieldType::int()], None, true);
        let body = method("demo/P", vec![callback()], None, false);
        assert_eq!(
            validate_signature(&target, &body, None, &[callback()]),
            Err(SignatureError::InstancePatchOnStaticTarget)
        );

        let body = method("demo/P", vec![callback()], Some(FieldType::int()), true);
        assert!(matches!(
            validate_signature(&target, &body, None, &[callback()]),
            Err(SignatureError::ReturnType { .. })
        ));

        let body = method("demo/P", vec![], None, true);
        assert_eq!(
            validate_signature(&target, &body, None, &[callback()]),
            Err(SignatureError::MissingParameters {
                expected: 1,
                found: 0
            })
        );

        let body = method(
            "demo/P",
            vec![callback(), FieldType::int(), FieldType::int()],
            None,
            true,
        );
        assert_eq!(
            validate_signature(&target, &body, None, &[callback()]),
            Err(SignatureError::TooManyParameters { max: 2, found: 3 })
        );

        let body = method("demo/P", vec![callback(), FieldType::long()], None, true);
        assert_eq!(
            validate_signature(&target, &body, None, &[callback()]),
            Err(SignatureError::ParameterType {
                index: 1,
                expected: "I".to_owned(),
                found: "J".to_owned()
            })
        );
    }

    #[test]
    fn call_shape() {
        let target = method("demo/T", vec![FieldType::boolean(), FieldType::int()], None, false);
        let remapped = method("demo/T", vec![callback(), FieldType::boolean()], None, false);
        let mut block = Block::new(Origin::Injected);
        let synthetic = [SyntheticArgument::new(callback(), vec![Instruction::LoadLocal(3)])];
        build_call(&mut block, &target, &remapped, &synthetic);

        let mut code = Code::default();
        let instructions: Vec<Instruction> = block
            .finish(&mut code)
            .unwrap()
            .into_iter()
            .map(|entry| entry.instruction)
            .collect();
        assert_eq!(
            instructions,
            vec![
                Instruction::LoadArg(0),
                Instruction::LoadLocal(3),
                Instruction::LoadArg(1),
                Instruction::Invoke(InvokeType::Direct, remapped),
            ]
        );
    }

    #[test]
    fn static_target_arguments_start_at_zero() {
        let target = method("demo/T", vec![FieldType::int(), FieldType::int()], None, true);
        let remapped = method("demo/T", vec![FieldType::int(), FieldType::int()], None, true);
        let mut block = Block::new(Origin::Injected);
        build_call(&mut block, &target, &remapped, &[]);
        let instructions: Vec<Instruction> = block
            .finish(&mut Code::default())
            .unwrap()
            .into_iter()
            .map(|entry| entry.instruction)
            .collect();
        assert_eq!(instructions[0], Instruction::LoadArg(0));
        assert_eq!(instructions[1], Instruction::LoadArg(1));
        assert_eq!(instructions.len(), 3);
    }
}

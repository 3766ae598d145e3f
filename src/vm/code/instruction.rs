use super::SynLabel;
use crate::vm::{BaseType, FieldRef, FieldType, MethodRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal values an instruction can push
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Constant {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl Constant {
    /// Static type of the pushed value
    pub fn field_type(&self) -> FieldType {
        match self {
            Constant::Null => FieldType::object(crate::vm::BinaryName::OBJECT),
            Constant::Int(_) => FieldType::int(),
            Constant::Long(_) => FieldType::long(),
            Constant::Float(_) => FieldType::float(),
            Constant::Double(_) => FieldType::double(),
            Constant::String(_) => FieldType::string(),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => f.write_str("null"),
            Constant::Int(i) => write!(f, "{}", i),
            Constant::Long(l) => write!(f, "{}L", l),
            Constant::Float(x) => write!(f, "{:?}f", x),
            Constant::Double(x) => write!(f, "{:?}d", x),
            Constant::String(s) => write!(f, "{:?}", s),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

/// How the callee of an invoke is bound
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum InvokeType {
    /// Statically bound: static methods and non-virtual instance calls
    Direct,
    /// Dispatched on the runtime class of the receiver
    Virtual,
}

/// Instructions of the stack machine
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Instruction {
    Nop,
    Push(Constant),

    LoadArg(u16),
    StoreArg(u16),
    LoadLocal(u16),
    StoreLocal(u16),

    Pop,
    Dup,
    Arithmetic(ArithmeticOp),
    Neg,
    Compare(Comparison),
    Convert(BaseType),

    /// Cast a reference, or unbox it when the target type is primitive
    CheckCast(FieldType),

    /// Reads a field (static fields take no receiver)
    GetField(FieldRef),
    /// Writes a field (static fields take no receiver)
    PutField(FieldRef),

    /// Allocate an object and run the given constructor on it
    New(MethodRef),
    Invoke(InvokeType, MethodRef),

    Branch(SynLabel),
    /// Pop a value, jump if its truthiness equals the flag
    BranchIf(bool, SynLabel),
    /// Pop two values, jump if the comparison holds
    BranchCompare(Comparison, SynLabel),
    Return,
    Throw,
}

/// Successors of an instruction
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Flow {
    /// Falls through to the next instruction
    Next,
    /// Always continues at the label
    Jump(SynLabel),
    /// Continues at the label or falls through
    Conditional(SynLabel),
    Return,
    Throw,
}

/// Number of values an instruction pops and then pushes
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct StackEffect {
    pub pop: usize,
    pub push: usize,
}

impl StackEffect {
    const fn new(pop: usize, push: usize) -> StackEffect {
        StackEffect { pop, push }
    }
}

impl Instruction {
    /// Effect on the evaluation stack
    ///
    /// `Return` is treated as popping nothing: analyses check the depth left at a return instead.
    pub fn stack_effect(&self) -> StackEffect {
        match self {
            Instruction::Nop => StackEffect::new(0, 0),
            Instruction::Push(_) => StackEffect::new(0, 1),
            Instruction::LoadArg(_) | Instruction::LoadLocal(_) => StackEffect::new(0, 1),
            Instruction::StoreArg(_) | Instruction::StoreLocal(_) => StackEffect::new(1, 0),
            Instruction::Pop => StackEffect::new(1, 0),
            Instruction::Dup => StackEffect::new(1, 2),
            Instruction::Arithmetic(_) | Instruction::Compare(_) => StackEffect::new(2, 1),
            Instruction::Neg | Instruction::Convert(_) | Instruction::CheckCast(_) => {
                StackEffect::new(1, 1)
            }
            Instruction::GetField(field) => {
                StackEffect::new(usize::from(!field.is_static), 1)
            }
            Instruction::PutField(field) => {
                StackEffect::new(usize::from(!field.is_static) + 1, 0)
            }
            Instruction::New(constructor) => {
                StackEffect::new(constructor.descriptor.parameters.len(), 1)
            }
            Instruction::Invoke(_, method) => StackEffect::new(
                method.argument_count(),
                usize::from(method.return_type().is_some()),
            ),
            Instruction::Branch(_) => StackEffect::new(0, 0),
            Instruction::BranchIf(_, _) => StackEffect::new(1, 0),
            Instruction::BranchCompare(_, _) => StackEffect::new(2, 0),
            Instruction::Return => StackEffect::new(0, 0),
            Instruction::Throw => StackEffect::new(1, 0),
        }
    }

    pub fn flow(&self) -> Flow {
        match self {
            Instruction::Branch(target) => Flow::Jump(*target),
            Instruction::BranchIf(_, target) | Instruction::BranchCompare(_, target) => {
                Flow::Conditional(*target)
            }
            Instruction::Return => Flow::Return,
            Instruction::Throw => Flow::Throw,
            _ => Flow::Next,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Instruction::Return)
    }

    /// Label this instruction may jump to
    pub fn branch_target(&self) -> Option<SynLabel> {
        match self.flow() {
            Flow::Jump(target) | Flow::Conditional(target) => Some(target),
            _ => None,
        }
    }

    /// Point a jump at `to` if it currently targets `from`
    pub fn retarget(&mut self, from: SynLabel, to: SynLabel) -> bool {
        match self {
            Instruction::Branch(target)
            | Instruction::BranchIf(_, target)
            | Instruction::BranchCompare(_, target)
                if *target == from =>
            {
                *target = to;
                true
            }
            _ => false,
        }
    }

    /// Type of the single value this instruction leaves on the stack, when it is statically known
    ///
    /// `method` is the method the instruction belongs to and `locals` its local variable types.
    pub fn pushed_type(&self, method: &MethodRef, locals: &[FieldType]) -> Option<FieldType> {
        match self {
            Instruction::Push(constant) => Some(constant.field_type()),
            Instruction::LoadArg(idx) => method.argument_type(usize::from(*idx)),
            Instruction::LoadLocal(idx) => locals.get(usize::from(*idx)).cloned(),
            Instruction::CheckCast(typ) => Some(typ.clone()),
            Instruction::Convert(base) => Some(FieldType::Base(*base)),
            Instruction::GetField(field) => Some(field.descriptor.clone()),
            Instruction::New(constructor) => Some(FieldType::object(constructor.class.clone())),
            Instruction::Invoke(_, callee) => callee.return_type().cloned(),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Nop => f.write_str("nop"),
            Instruction::Push(constant) => write!(f, "push {}", constant),
            Instruction::LoadArg(idx) => write!(f, "ldarg {}", idx),
            Instruction::StoreArg(idx) => write!(f, "starg {}", idx),
            Instruction::LoadLocal(idx) => write!(f, "ldloc {}", idx),
            Instruction::StoreLocal(idx) => write!(f, "stloc {}", idx),
            Instruction::Pop => f.write_str("pop"),
            Instruction::Dup => f.write_str("dup"),
            Instruction::Arithmetic(op) => write!(f, "{}", format!("{:?}", op).to_lowercase()),
            Instruction::Neg => f.write_str("neg"),
            Instruction::Compare(cmp) => write!(f, "cmp.{}", format!("{:?}", cmp).to_lowercase()),
            Instruction::Convert(base) => write!(f, "conv {:?}", base),
            Instruction::CheckCast(typ) => write!(f, "checkcast {}", typ),
            Instruction::GetField(field) if field.is_static => write!(f, "getstatic {}", field),
            Instruction::GetField(field) => write!(f, "getfield {}", field),
            Instruction::PutField(field) if field.is_static => write!(f, "putstatic {}", field),
            Instruction::PutField(field) => write!(f, "putfield {}", field),
            Instruction::New(constructor) => write!(f, "new {}", constructor),
            Instruction::Invoke(InvokeType::Direct, method) => write!(f, "call {}", method),
            Instruction::Invoke(InvokeType::Virtual, method) => write!(f, "callvirt {}", method),
            Instruction::Branch(target) => write!(f, "br {}", target),
            Instruction::BranchIf(true, target) => write!(f, "brtrue {}", target),
            Instruction::BranchIf(false, target) => write!(f, "brfalse {}", target),
            Instruction::BranchCompare(cmp, target) => {
                write!(f, "b.{} {}", format!("{:?}", cmp).to_lowercase(), target)
            }
            Instruction::Return => f.write_str("ret"),
            Instruction::Throw => f.write_str("throw"),
        }
    }
}

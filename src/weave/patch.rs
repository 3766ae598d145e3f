//! Declarations of patches, as handed over by whatever discovered them

use super::Settings;
use crate::vm::{
    BinaryName, Constant, FieldRef, FieldType, InvokeKinds, MethodDescriptor, MethodRef,
    UnqualifiedName,
};
use serde::{Deserialize, Serialize};

/// A class of patches and the classes it applies to
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MixinDeclaration {
    /// Class declaring the patch methods
    pub name: BinaryName,

    /// Classes whose methods get patched
    pub targets: Vec<BinaryName>,

    /// Priority of injectors that do not set their own
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub methods: Vec<MethodDeclaration>,

    /// Fields of the mixin that stand for same-named fields of the target
    #[serde(default)]
    pub shadow_fields: Vec<ShadowField>,
}

/// A method declared on a mixin
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodDeclaration {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    #[serde(default)]
    pub is_static: bool,

    /// Stands for the same-named method of the target rather than being copied onto it
    #[serde(default)]
    pub shadow: bool,

    /// At most one is allowed
    #[serde(default)]
    pub injectors: Vec<Injector>,

    #[serde(default)]
    pub targets: Vec<TargetDescriptor>,

    #[serde(default)]
    pub selectors: Vec<Selector>,
}

impl MethodDeclaration {
    pub fn method_ref(&self, mixin: &BinaryName) -> MethodRef {
        MethodRef::new(
            mixin.clone(),
            self.name.clone(),
            self.descriptor.clone(),
            self.is_static,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShadowField {
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
    #[serde(default)]
    pub is_static: bool,
}

impl ShadowField {
    pub fn field_ref(&self, mixin: &BinaryName) -> FieldRef {
        FieldRef {
            class: mixin.clone(),
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
            is_static: self.is_static,
        }
    }
}

/// Turns a method into a patch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Injector {
    pub kind: InjectorKind,

    /// Name used in diagnostics (defaults to the kind name)
    #[serde(default)]
    pub id: Option<String>,

    /// Defaults to the priority of the mixin
    #[serde(default)]
    pub priority: Option<i32>,

    #[serde(default)]
    pub disabled: bool,

    /// Losing a replacement to a higher priority patch is fatal
    #[serde(default)]
    pub required: bool,

    #[serde(default = "default_min_injections")]
    pub min_injections: usize,

    /// `None` is unbounded
    #[serde(default)]
    pub max_injections: Option<usize>,
}

fn default_min_injections() -> usize {
    1
}

impl Injector {
    pub fn new(kind: InjectorKind) -> Injector {
        Injector {
            kind,
            id: None,
            priority: None,
            disabled: false,
            required: false,
            min_injections: default_min_injections(),
            max_injections: None,
        }
    }

    pub fn describe(&self, mixin: &BinaryName) -> String {
        let id = self.id.as_deref().unwrap_or_else(|| self.kind.name());
        format!("injector '{}' in {}", id, mixin)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InjectorKind {
    /// Base of every injector kind, which cannot be applied itself
    Injector,

    /// Call the patch before the selected instruction, with a callback that can cancel the
    /// rest of the method
    Inject {
        #[serde(default)]
        cancellable: bool,
        #[serde(default)]
        locals: LocalCapture,
    },

    /// Replace a constant push with a call that receives the constant and returns its
    /// replacement
    ModifyConstant {
        #[serde(default)]
        locals: LocalCapture,
    },

    /// Replace a call with a call to the patch, which receives the original receiver and
    /// arguments
    Redirect,

    /// Pass the value pushed by the selected instruction through the patch
    ModifyValue,
}

/// Where a patch goes relative to the instruction it selects
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Placement {
    Before,
    Replace,
    After,
}

impl InjectorKind {
    pub fn name(&self) -> &'static str {
        match self {
            InjectorKind::Injector => "Injector",
            InjectorKind::Inject { .. } => "Inject",
            InjectorKind::ModifyConstant { .. } => "ModifyConstant",
            InjectorKind::Redirect => "Redirect",
            InjectorKind::ModifyValue => "ModifyValue",
        }
    }

    /// `None` for the abstract base kind
    pub fn placement(&self) -> Option<Placement> {
        match self {
            InjectorKind::Injector => None,
            InjectorKind::Inject { .. } => Some(Placement::Before),
            InjectorKind::ModifyConstant { .. } | InjectorKind::Redirect => {
                Some(Placement::Replace)
            }
            InjectorKind::ModifyValue => Some(Placement::After),
        }
    }
}

/// What to do with local variables of the target at the injection point
///
/// Accepted for compatibility with existing declarations. Locals are never captured.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum LocalCapture {
    FailException,
    FailHard,
    FailSoft,
    #[default]
    Dont,
}

/// Names a method on each target class
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub name: UnqualifiedName,

    /// Exact parameter types, or `None` to match every overload
    #[serde(default)]
    pub parameters: Option<Vec<FieldType>>,

    #[serde(default)]
    pub on_failure: FailMode,
}

impl TargetDescriptor {
    pub fn describe(&self) -> String {
        match &self.parameters {
            None => self.name.to_string(),
            Some(parameters) => {
                let params: Vec<String> = parameters.iter().map(|p| p.to_string()).collect();
                format!("{}({})", self.name, params.join(""))
            }
        }
    }
}

/// How to report a target descriptor that matches no method
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum FailMode {
    /// Abort the run
    #[default]
    Abort,
    /// Report an error and carry on
    Log,
    /// Carry on
    Silent,
}

/// Describes which instructions of a target method a patch applies to
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub at: SelectorKind,

    /// Which match to keep (0-based), or `None` to keep all of them
    #[serde(default)]
    pub ordinal: Option<usize>,

    /// Defaults to [`Settings::default_shift`]
    #[serde(default)]
    pub shift: Option<Shift>,

    /// Name used in diagnostics (defaults to the kind name)
    #[serde(default)]
    pub id: Option<String>,
}

impl Selector {
    pub fn new(at: SelectorKind) -> Selector {
        Selector {
            at,
            ordinal: None,
            shift: None,
            id: None,
        }
    }

    pub fn describe(&self, mixin: &BinaryName) -> String {
        let id = self.id.as_deref().unwrap_or_else(|| self.at.name());
        format!("selector '{}' in {}", id, mixin)
    }

    /// Offset adjustment applied to matches
    pub fn resolve_shift(&self, settings: &Settings) -> isize {
        self.shift.unwrap_or(settings.default_shift).resolve(settings)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SelectorKind {
    /// Base of every selector kind, which matches nothing itself
    At,

    /// The first instruction
    Head,

    /// The last instruction
    Tail,

    /// Every return
    Return,

    /// Calls to a method
    Invoke {
        class: BinaryName,
        name: UnqualifiedName,
        /// Exact parameter types, or `None` for any overload
        #[serde(default)]
        parameters: Option<Vec<FieldType>>,
        #[serde(default)]
        kinds: InvokeKinds,
    },

    /// Pushes of a literal
    LoadConstant { value: Literal },
}

impl SelectorKind {
    pub fn name(&self) -> &'static str {
        match self {
            SelectorKind::At => "At",
            SelectorKind::Head => "Head",
            SelectorKind::Tail => "Tail",
            SelectorKind::Return => "Return",
            SelectorKind::Invoke { .. } => "Invoke",
            SelectorKind::LoadConstant { .. } => "LoadConstant",
        }
    }
}

/// Offset adjustment applied to a selector match
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Shift {
    By(isize),
    /// Back by [`Settings::shift_before`]
    Before,
    /// Forward by [`Settings::shift_after`]
    After,
}

impl Shift {
    pub fn resolve(&self, settings: &Settings) -> isize {
        match self {
            Shift::By(by) => *by,
            Shift::Before => (settings.shift_before as isize).saturating_neg(),
            Shift::After => settings.shift_after as isize,
        }
    }
}

/// Literal a constant selector looks for
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Booleans are pushed as the ints `0` and `1`
    Boolean(bool),
}

impl Literal {
    /// Literal types must agree exactly: `Int(1)` never matches a pushed `Long(1)`
    pub fn matches(&self, constant: &Constant) -> bool {
        match (self, constant) {
            (Literal::Int(a), Constant::Int(b)) => a == b,
            (Literal::Boolean(a), Constant::Int(b)) => i32::from(*a) == *b,
            (Literal::Long(a), Constant::Long(b)) => a == b,
            (Literal::Float(a), Constant::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Literal::Double(a), Constant::Double(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Literal::String(a), Constant::String(b)) => a == b,
            _ => false,
        }
    }
}

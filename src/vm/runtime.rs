//! Members of the runtime support classes that woven code calls into
//!
//! `CallbackInfo` carries the cancellation state of an intercepted void method and
//! `CallbackInfoReturn` (a subclass) additionally carries the value to return instead.

use super::{BinaryName, FieldType, MethodDescriptor, MethodRef, UnqualifiedName};

/// Callback class handed to patches of a method (depends on whether the method returns a value)
pub fn callback_class(returns_value: bool) -> BinaryName {
    if returns_value {
        BinaryName::CALLBACKINFORETURN
    } else {
        BinaryName::CALLBACKINFO
    }
}

/// `<init>(Z)V`, the flag being whether the callback may be cancelled
pub fn callback_constructor(returns_value: bool) -> MethodRef {
    MethodRef::new(
        callback_class(returns_value),
        UnqualifiedName::INIT,
        MethodDescriptor::new(vec![FieldType::boolean()], None),
        false,
    )
}

/// `CallbackInfo.isCancellable()Z`
pub fn is_cancellable() -> MethodRef {
    MethodRef::new(
        BinaryName::CALLBACKINFO,
        UnqualifiedName::ISCANCELLABLE,
        MethodDescriptor::new(vec![], Some(FieldType::boolean())),
        false,
    )
}

/// `CallbackInfo.isCancelled()Z`
pub fn is_cancelled() -> MethodRef {
    MethodRef::new(
        BinaryName::CALLBACKINFO,
        UnqualifiedName::ISCANCELLED,
        MethodDescriptor::new(vec![], Some(FieldType::boolean())),
        false,
    )
}

/// `CallbackInfo.cancel()V` or `CallbackInfoReturn.cancel(Lmixweave/Object;)V`
pub fn cancel(returns_value: bool) -> MethodRef {
    let parameters = if returns_value {
        vec![FieldType::object(BinaryName::OBJECT)]
    } else {
        vec![]
    };
    MethodRef::new(
        callback_class(returns_value),
        UnqualifiedName::CANCEL,
        MethodDescriptor::new(parameters, None),
        false,
    )
}

/// `CallbackInfoReturn.getReturnValue()Lmixweave/Object;`
pub fn get_return_value() -> MethodRef {
    MethodRef::new(
        BinaryName::CALLBACKINFORETURN,
        UnqualifiedName::GETRETURNVALUE,
        MethodDescriptor::new(vec![], Some(FieldType::object(BinaryName::OBJECT))),
        false,
    )
}

/// Every runtime member, for registering into a class graph
pub fn members() -> Vec<MethodRef> {
    vec![
        callback_constructor(false),
        callback_constructor(true),
        is_cancellable(),
        is_cancelled(),
        cancel(false),
        cancel(true),
        get_return_value(),
    ]
}

use bitflags::bitflags;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Access flags on methods
    #[derive(Default)]
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// Kinds of invocation an invoke selector accepts
    pub struct InvokeKinds: u8 {
        /// Statically bound calls (static methods and non-virtual instance calls)
        const DIRECT = 0x01;
        /// Virtually dispatched instance calls
        const VIRTUAL = 0x02;
    }
}

impl Default for InvokeKinds {
    fn default() -> InvokeKinds {
        InvokeKinds::all()
    }
}

impl Serialize for MethodAccessFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.bits())
    }
}

impl<'de> Deserialize<'de> for MethodAccessFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u16::deserialize(deserializer)?;
        MethodAccessFlags::from_bits(bits)
            .ok_or_else(|| D::Error::custom(format!("invalid method access flags {:#06x}", bits)))
    }
}

impl Serialize for InvokeKinds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for InvokeKinds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u8::deserialize(deserializer)?;
        InvokeKinds::from_bits(bits)
            .ok_or_else(|| D::Error::custom(format!("invalid invoke kinds {:#04x}", bits)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flags_serialize_as_bits() {
        let flags = MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC;
        assert_eq!(serde_json::to_string(&flags).unwrap(), "4104");
        let back: MethodAccessFlags = serde_json::from_str("4104").unwrap();
        assert_eq!(back, flags);
        assert!(serde_json::from_str::<MethodAccessFlags>("4").is_err());
    }

    #[test]
    fn invoke_kinds_default_to_all() {
        assert!(InvokeKinds::default().contains(InvokeKinds::DIRECT | InvokeKinds::VIRTUAL));
    }
}

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods and fields
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes, written `package/sub/Klass`
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BinaryName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extact the raw underlying string data
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extact the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(format!("Unqualified name '{}' is empty", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(UnqualifiedName(Cow::Owned(name)))
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(format!("Binary name '{}' is empty", name))
        } else {
            name.split('/').map(UnqualifiedName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl TryFrom<String> for UnqualifiedName {
    type Error = String;

    fn try_from(name: String) -> Result<Self, String> {
        UnqualifiedName::from_string(name)
    }
}

impl TryFrom<String> for BinaryName {
    type Error = String;

    fn try_from(name: String) -> Result<Self, String> {
        BinaryName::from_string(name)
    }
}

impl From<UnqualifiedName> for String {
    fn from(name: UnqualifiedName) -> String {
        name.0.into_owned()
    }
}

impl From<BinaryName> for String {
    fn from(name: BinaryName) -> String {
        name.0.into_owned()
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl UnqualifiedName {
    /// Name of the synthetic clone of `method` from mixin `mixin`
    ///
    /// Slashes in the mixin name become underscores, so `demo/Patch` and `run` produce
    /// `mixin$demo_Patch$run`. Distinct mixins can share a mangled name (`demo/a_B` and
    /// `demo_a/B`), so callers must check for collisions.
    pub fn mangled(mixin: &BinaryName, method: &UnqualifiedName) -> UnqualifiedName {
        let mixin = mixin.as_str().replace('/', "_");
        UnqualifiedName(Cow::Owned(format!("mixin${}${}", mixin, method.as_str())))
    }

    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");

    // Runtime support members
    pub const CANCEL: Self = Self::name("cancel");
    pub const GETRETURNVALUE: Self = Self::name("getReturnValue");
    pub const ISCANCELLED: Self = Self::name("isCancelled");
    pub const ISCANCELLABLE: Self = Self::name("isCancellable");
}

impl BinaryName {
    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    // Runtime support types
    pub const OBJECT: Self = Self::name("mixweave/Object");
    pub const STRING: Self = Self::name("mixweave/String");
    pub const CALLBACKINFO: Self = Self::name("mixweave/CallbackInfo");
    pub const CALLBACKINFORETURN: Self = Self::name("mixweave/CallbackInfoReturn");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validation() {
        assert!(UnqualifiedName::from_string("run".to_owned()).is_ok());
        assert!(UnqualifiedName::from_string("a/b".to_owned()).is_err());
        assert!(UnqualifiedName::from_string(String::new()).is_err());
        assert!(BinaryName::from_string("demo/Target".to_owned()).is_ok());
        assert!(BinaryName::from_string("demo//Target".to_owned()).is_err());
        assert!(BinaryName::from_string("demo/Tar;get".to_owned()).is_err());
    }

    #[test]
    fn mangling() {
        let mixin = BinaryName::from_string("demo/Patch".to_owned()).unwrap();
        let method = UnqualifiedName::from_string("onHead".to_owned()).unwrap();
        let mangled = UnqualifiedName::mangled(&mixin, &method);
        assert_eq!(mangled.as_str(), "mixin$demo_Patch$onHead");
        assert!(UnqualifiedName::check_valid(mangled.as_str()).is_ok());
    }
}

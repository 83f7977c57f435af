//! Resource addresses
//!
//! Provides [`ResourceAddress`], the IaC engine's addressing grammar:
//!
//! - `module.db` names a module and everything under it
//! - `aws_instance.web` names a resource and all of its instances
//! - `aws_instance.web[0]`, `module.app["eu"].aws_s3_bucket.logs` name a
//!   single instance
//! - `data.aws_ami.base` names a data source

use std::fmt::{self, Display, Formatter};
use std::iter::Peekable;
use std::str::{CharIndices, FromStr};

/// Instance key of a counted (`[0]`) or keyed (`["eu"]`) object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstanceKey {
    /// `count` index
    Index(u64),
    /// `for_each` key
    Name(String),
}

impl Display for InstanceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Name(name) => {
                f.write_str("[\"")?;
                for c in name.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"]")
            }
        }
    }
}

/// Managed resource or data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceMode {
    /// Resource the engine creates and destroys
    Managed,
    /// Read-only data source
    Data,
}

impl ResourceMode {
    /// Name used by the state file
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Managed => "managed",
            Self::Data => "data",
        }
    }
}

/// One `module.NAME[KEY]` step of a module path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleStep {
    /// Module call name
    pub name: String,
    /// Instance key when the module call uses count/for_each
    pub key: Option<InstanceKey>,
}

impl ModuleStep {
    /// Step without an instance key
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
        }
    }
}

/// Resource part of an address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceRef {
    /// Managed or data
    pub mode: ResourceMode,
    /// Resource type, e.g. `aws_instance`
    pub type_name: String,
    /// Resource name, e.g. `web`
    pub name: String,
    /// Instance key, absent for single-instance resources
    pub key: Option<InstanceKey>,
}

/// Address of a module, a resource, or a resource instance
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceAddress {
    module: Vec<ModuleStep>,
    resource: Option<ResourceRef>,
}

impl ResourceAddress {
    /// Address of a managed resource in the given module
    #[must_use]
    pub fn managed(
        module: Vec<ModuleStep>,
        type_name: impl Into<String>,
        name: impl Into<String>,
        key: Option<InstanceKey>,
    ) -> Self {
        Self {
            module,
            resource: Some(ResourceRef {
                mode: ResourceMode::Managed,
                type_name: type_name.into(),
                name: name.into(),
                key,
            }),
        }
    }

    /// Address from a module path and a resource part
    #[inline]
    #[must_use]
    pub fn from_parts(module: Vec<ModuleStep>, resource: ResourceRef) -> Self {
        Self {
            module,
            resource: Some(resource),
        }
    }

    /// Module address (no resource part)
    ///
    /// # Errors
    /// Returns [`AddressError::Empty`] for an empty module path
    pub fn module(module: Vec<ModuleStep>) -> Result<Self, AddressError> {
        if module.is_empty() {
            return Err(AddressError::Empty);
        }
        Ok(Self {
            module,
            resource: None,
        })
    }

    /// Module path, root first
    #[inline]
    #[must_use]
    pub fn module_path(&self) -> &[ModuleStep] {
        &self.module
    }

    /// Resource part, `None` for module addresses
    #[inline]
    #[must_use]
    pub fn resource(&self) -> Option<&ResourceRef> {
        self.resource.as_ref()
    }

    /// True if this names a module rather than a resource
    #[inline]
    #[must_use]
    pub fn is_module(&self) -> bool {
        self.resource.is_none()
    }

    /// True if this names a data source
    #[inline]
    #[must_use]
    pub fn is_data(&self) -> bool {
        self.resource
            .as_ref()
            .is_some_and(|r| r.mode == ResourceMode::Data)
    }

    /// Module path rendered as `module.a.module.b`, `None` at the root
    #[must_use]
    pub fn module_string(&self) -> Option<String> {
        if self.module.is_empty() {
            return None;
        }
        let mut out = String::new();
        write_module_path(&mut out, &self.module);
        Some(out)
    }

    /// Same address with a different module path
    #[must_use]
    pub fn with_module(&self, module: Vec<ModuleStep>) -> Self {
        Self {
            module,
            resource: self.resource.clone(),
        }
    }

    /// Same resource with a different instance key
    #[must_use]
    pub fn with_key(&self, key: Option<InstanceKey>) -> Self {
        let mut out = self.clone();
        if let Some(r) = out.resource.as_mut() {
            r.key = key;
        }
        out
    }

    /// Whether `other` (an instance address) falls under this address
    ///
    /// - a module address contains everything below that module path; an
    ///   unkeyed last step (`module.app`) covers every instance of the call
    /// - a resource address without a key contains all of its instances
    /// - an instance address contains only itself
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        match (&self.resource, &other.resource) {
            (None, _) => {
                let Some((last, parents)) = self.module.split_last() else {
                    return true;
                };
                let depth = self.module.len();
                other.module.len() >= depth
                    && other.module[..depth - 1] == parents[..]
                    && other.module[depth - 1].name == last.name
                    && (last.key.is_none() || other.module[depth - 1].key == last.key)
            }
            (Some(mine), Some(theirs)) => {
                self.module == other.module
                    && mine.mode == theirs.mode
                    && mine.type_name == theirs.type_name
                    && mine.name == theirs.name
                    && (mine.key.is_none() || mine.key == theirs.key)
            }
            (Some(_), None) => false,
        }
    }

    /// Whether either address contains the other
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.contains(other) || other.contains(self)
    }
}

fn write_module_path(out: &mut String, module: &[ModuleStep]) {
    for (i, step) in module.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str("module.");
        out.push_str(&step.name);
        if let Some(key) = &step.key {
            out.push_str(&key.to_string());
        }
    }
}

impl Display for ResourceAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_module_path(&mut out, &self.module);
        if let Some(r) = &self.resource {
            if !out.is_empty() {
                out.push('.');
            }
            if r.mode == ResourceMode::Data {
                out.push_str("data.");
            }
            out.push_str(&r.type_name);
            out.push('.');
            out.push_str(&r.name);
            if let Some(key) = &r.key {
                out.push_str(&key.to_string());
            }
        }
        f.write_str(&out)
    }
}

/// One `ident[key]` component between dots
struct Part {
    ident: String,
    key: Option<InstanceKey>,
}

impl FromStr for ResourceAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let parts = split_parts(s)?;
        let mut module = Vec::new();
        let mut i = 0;

        while i < parts.len() && parts[i].ident == "module" {
            if parts[i].key.is_some() {
                return Err(AddressError::invalid(s, "key on `module` keyword"));
            }
            let step = parts
                .get(i + 1)
                .ok_or_else(|| AddressError::invalid(s, "`module` without a name"))?;
            module.push(ModuleStep {
                name: step.ident.clone(),
                key: step.key.clone(),
            });
            i += 2;
        }

        let rest = &parts[i..];
        if rest.is_empty() {
            return Self::module(module);
        }

        let (mode, rest) = if rest[0].ident == "data" && rest.len() == 3 {
            if rest[0].key.is_some() {
                return Err(AddressError::invalid(s, "key on `data` keyword"));
            }
            (ResourceMode::Data, &rest[1..])
        } else {
            (ResourceMode::Managed, rest)
        };

        match rest {
            [type_part, name_part] => {
                if type_part.key.is_some() {
                    return Err(AddressError::invalid(s, "key on resource type"));
                }
                Ok(Self {
                    module,
                    resource: Some(ResourceRef {
                        mode,
                        type_name: type_part.ident.clone(),
                        name: name_part.ident.clone(),
                        key: name_part.key.clone(),
                    }),
                })
            }
            _ => Err(AddressError::invalid(
                s,
                "expected TYPE.NAME after the module path",
            )),
        }
    }
}

fn split_parts(s: &str) -> Result<Vec<Part>, AddressError> {
    let mut parts = Vec::new();
    let mut chars = s.char_indices().peekable();

    loop {
        let mut ident = String::new();
        while let Some(&(_, c)) = chars.peek() {
            if c == '.' || c == '[' {
                break;
            }
            ident.push(c);
            chars.next();
        }
        validate_ident(s, &ident)?;

        let key = if matches!(chars.peek(), Some(&(_, '['))) {
            chars.next();
            Some(parse_key(s, &mut chars)?)
        } else {
            None
        };
        parts.push(Part { ident, key });

        match chars.next() {
            None => break,
            Some((_, '.')) => {}
            Some((pos, c)) => {
                return Err(AddressError::invalid(
                    s,
                    format!("unexpected '{c}' at offset {pos}"),
                ))
            }
        }
    }

    Ok(parts)
}

fn validate_ident(s: &str, ident: &str) -> Result<(), AddressError> {
    let mut chars = ident.chars();
    match chars.next() {
        None => Err(AddressError::invalid(s, "empty name")),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_') => Err(AddressError::invalid(
            s,
            format!("name `{ident}` must start with a letter or underscore"),
        )),
        Some(_) if chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') => Ok(()),
        Some(_) => Err(AddressError::invalid(
            s,
            format!("name `{ident}` contains invalid characters"),
        )),
    }
}

fn parse_key(s: &str, chars: &mut Peekable<CharIndices<'_>>) -> Result<InstanceKey, AddressError> {
    if matches!(chars.peek(), Some(&(_, '"'))) {
        chars.next();
        let mut name = String::new();
        loop {
            match chars.next() {
                Some((_, '\\')) => match chars.next() {
                    Some((_, c)) => name.push(c),
                    None => return Err(AddressError::invalid(s, "unterminated key")),
                },
                Some((_, '"')) => break,
                Some((_, c)) => name.push(c),
                None => return Err(AddressError::invalid(s, "unterminated key")),
            }
        }
        return match chars.next() {
            Some((_, ']')) => Ok(InstanceKey::Name(name)),
            _ => Err(AddressError::invalid(s, "expected ']' after key")),
        };
    }

    let mut digits = String::new();
    loop {
        match chars.next() {
            Some((_, ']')) => break,
            Some((_, c)) => digits.push(c),
            None => return Err(AddressError::invalid(s, "unterminated key")),
        }
    }
    digits
        .parse::<u64>()
        .map(InstanceKey::Index)
        .map_err(|_| AddressError::invalid(s, format!("invalid index `{digits}`")))
}

impl serde::Serialize for ResourceAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ResourceAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors parsing a resource address
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// Empty input
    #[error("address is empty")]
    Empty,

    /// Malformed input
    #[error("invalid address '{address}': {reason}")]
    Invalid { address: String, reason: String },
}

impl AddressError {
    fn invalid(address: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}

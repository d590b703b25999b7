use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const DEFAULT_QUALIFIER: &str = "Default";
pub const ANY_QUALIFIER: &str = "Any";
pub const NAMED_QUALIFIER: &str = "Named";
pub const NEW_QUALIFIER: &str = "New";

/// Value of a qualifier annotation member
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Class(String),
    Enum(String),
    Array(Vec<MemberValue>),
}

impl fmt::Display for MemberValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "\"{}\"", v),
            Self::Class(v) => write!(f, "{}.class", v),
            Self::Enum(v) => write!(f, "{}", v),
            Self::Array(values) => {
                let inner: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{{{}}}", inner.join(", "))
            }
        }
    }
}

/// A qualifier annotation instance: its type name and member values.
///
/// Members listed as non-binding are carried for diagnostics but ignored
/// when two qualifiers are compared for resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Qualifier {
    name: String,
    members: BTreeMap<String, MemberValue>,
    non_binding: BTreeSet<String>,
}

impl Qualifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeMap::new(),
            non_binding: BTreeSet::new(),
        }
    }

    pub fn default_qualifier() -> Self {
        Self::new(DEFAULT_QUALIFIER)
    }

    pub fn any() -> Self {
        Self::new(ANY_QUALIFIER)
    }

    /// `@Named(value)`; an empty value asks for the default name
    pub fn named(value: impl Into<String>) -> Self {
        Self::new(NAMED_QUALIFIER).with_member("value", MemberValue::Str(value.into()))
    }

    /// `@New`, optionally naming the class to instantiate
    pub fn new_qualifier(target: Option<&str>) -> Self {
        let qualifier = Self::new(NEW_QUALIFIER);
        match target {
            Some(class) => qualifier.with_member("value", MemberValue::Class(class.to_string())),
            None => qualifier,
        }
    }

    pub fn with_member(mut self, member: impl Into<String>, value: MemberValue) -> Self {
        self.members.insert(member.into(), value);
        self
    }

    /// Add a member that does not take part in resolution
    pub fn with_non_binding_member(mut self, member: impl Into<String>, value: MemberValue) -> Self {
        let member = member.into();
        self.non_binding.insert(member.clone());
        self.members.insert(member, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member(&self, member: &str) -> Option<&MemberValue> {
        self.members.get(member)
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_QUALIFIER
    }

    pub fn is_any(&self) -> bool {
        self.name == ANY_QUALIFIER
    }

    pub fn is_named(&self) -> bool {
        self.name == NAMED_QUALIFIER
    }

    pub fn is_new(&self) -> bool {
        self.name == NEW_QUALIFIER
    }

    /// Value of a `@Named` qualifier; `None` when absent or empty
    pub fn named_value(&self) -> Option<&str> {
        if !self.is_named() {
            return None;
        }
        match self.members.get("value") {
            Some(MemberValue::Str(value)) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    /// Annotation-member equality ignoring non-binding members
    pub fn matches(&self, other: &Qualifier) -> bool {
        if self.name != other.name {
            return false;
        }
        let binding = |q: &Qualifier| {
            q.members
                .iter()
                .filter(|(k, _)| !self.non_binding.contains(*k) && !other.non_binding.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<BTreeMap<_, _>>()
        };
        binding(self) == binding(other)
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)?;
        if !self.members.is_empty() {
            let members: Vec<String> = self
                .members
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "({})", members.join(", "))?;
        }
        Ok(())
    }
}

/// Required qualifiers with an empty set normalized to `@Default`
pub fn normalize_required(qualifiers: &[Qualifier]) -> Vec<Qualifier> {
    if qualifiers.is_empty() {
        vec![Qualifier::default_qualifier()]
    } else {
        qualifiers.to_vec()
    }
}

/// Every required qualifier must be present among the candidate's; `@Any`
/// always matches.
pub fn qualifiers_match(required: &[Qualifier], candidate: &[Qualifier]) -> bool {
    normalize_required(required)
        .iter()
        .all(|r| r.is_any() || candidate.iter().any(|c| r.matches(c)))
}

/// Qualifier set a bean carries once registered: declared qualifiers,
/// `@Default` when nothing but `@Named`/`@Any` is declared, `@Any`, and
/// `@Named(name)` for named beans.
pub fn normalize_bean_qualifiers(declared: &[Qualifier], name: Option<&str>) -> Vec<Qualifier> {
    let mut qualifiers: Vec<Qualifier> = Vec::with_capacity(declared.len() + 2);
    for q in declared {
        // A valueless @Named is replaced by the resolved name below
        if q.is_named() && q.named_value().is_none() {
            continue;
        }
        push_unique(&mut qualifiers, q.clone());
    }
    if !qualifiers.iter().any(|q| !q.is_named() && !q.is_any()) {
        push_unique(&mut qualifiers, Qualifier::default_qualifier());
    }
    if let Some(name) = name {
        if !qualifiers.iter().any(Qualifier::is_named) {
            qualifiers.push(Qualifier::named(name));
        }
    }
    push_unique(&mut qualifiers, Qualifier::any());
    qualifiers
}

/// Push a qualifier unless an equal one is already present
pub fn push_unique(qualifiers: &mut Vec<Qualifier>, qualifier: Qualifier) -> bool {
    if qualifiers.iter().any(|q| q.matches(&qualifier)) {
        false
    } else {
        qualifiers.push(qualifier);
        true
    }
}

/// Render a qualifier set for diagnostics
pub fn describe(qualifiers: &[Qualifier]) -> Vec<String> {
    qualifiers.iter().map(ToString::to_string).collect()
}

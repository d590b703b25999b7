use std::fmt;

/// Raw name of the root of every class hierarchy
pub const OBJECT_TYPE: &str = "Object";

/// A declared type: a bean API type, an injection point's required type or a
/// type argument of either.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// A class or interface, raw when `args` is empty
    Class { name: String, args: Vec<TypeRef> },
    Primitive(String),
    Array(Box<TypeRef>),
    Wildcard {
        upper: Vec<TypeRef>,
        lower: Vec<TypeRef>,
    },
    Variable { name: String, bounds: Vec<TypeRef> },
}

impl TypeRef {
    pub fn class(name: impl Into<String>) -> Self {
        Self::Class {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn parameterized(name: impl Into<String>, args: Vec<TypeRef>) -> Self {
        Self::Class {
            name: name.into(),
            args,
        }
    }

    pub fn primitive(name: impl Into<String>) -> Self {
        Self::Primitive(name.into())
    }

    pub fn array(component: TypeRef) -> Self {
        Self::Array(Box::new(component))
    }

    /// The unbounded wildcard `?`
    pub fn wildcard() -> Self {
        Self::Wildcard {
            upper: Vec::new(),
            lower: Vec::new(),
        }
    }

    /// `? extends bound`
    pub fn wildcard_extends(bound: TypeRef) -> Self {
        Self::Wildcard {
            upper: vec![bound],
            lower: Vec::new(),
        }
    }

    /// `? super bound`
    pub fn wildcard_super(bound: TypeRef) -> Self {
        Self::Wildcard {
            upper: Vec::new(),
            lower: vec![bound],
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable {
            name: name.into(),
            bounds: Vec::new(),
        }
    }

    pub fn bounded_variable(name: impl Into<String>, bounds: Vec<TypeRef>) -> Self {
        Self::Variable {
            name: name.into(),
            bounds,
        }
    }

    pub fn object() -> Self {
        Self::class(OBJECT_TYPE)
    }

    /// Raw class or primitive name; `None` for arrays, wildcards and variables
    pub fn raw_name(&self) -> Option<&str> {
        match self {
            Self::Class { name, .. } => Some(name),
            Self::Primitive(name) => Some(name),
            _ => None,
        }
    }

    /// Actual type arguments of a parameterized class
    pub fn args(&self) -> &[TypeRef] {
        match self {
            Self::Class { args, .. } => args,
            _ => &[],
        }
    }

    pub fn is_parameterized(&self) -> bool {
        !self.args().is_empty()
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Primitive(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable { .. })
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard { .. })
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Class { name, args } if name == OBJECT_TYPE && args.is_empty())
    }

    /// True for `?` and for a type variable without bounds
    pub fn is_unbounded(&self) -> bool {
        match self {
            Self::Wildcard { upper, lower } => {
                lower.is_empty() && upper.iter().all(TypeRef::is_object)
            }
            Self::Variable { bounds, .. } => bounds.iter().all(TypeRef::is_object),
            _ => false,
        }
    }

    pub fn has_wildcard_arg(&self) -> bool {
        self.args().iter().any(TypeRef::is_wildcard)
    }

    pub fn has_variable_arg(&self) -> bool {
        self.args().iter().any(TypeRef::is_variable)
    }

    /// Same class, ignoring type arguments
    pub fn same_raw(&self, other: &TypeRef) -> bool {
        match (self.raw_name(), other.raw_name()) {
            (Some(a), Some(b)) => a == b && self.is_primitive() == other.is_primitive(),
            _ => false,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class { name, args } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write!(f, "<{}>", join(args))?;
                }
                Ok(())
            }
            Self::Primitive(name) => write!(f, "{}", name),
            Self::Array(component) => write!(f, "{}[]", component),
            Self::Wildcard { upper, lower } => {
                write!(f, "?")?;
                if !upper.is_empty() {
                    write!(f, " extends {}", join(upper))?;
                }
                if !lower.is_empty() {
                    write!(f, " super {}", join(lower))?;
                }
                Ok(())
            }
            Self::Variable { name, .. } => write!(f, "{}", name),
        }
    }
}

fn join(types: &[TypeRef]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Subtype knowledge used when checking wildcard and type-variable bounds
pub trait TypeHierarchy {
    /// Whether the raw class `sub` is `sup` or one of its subtypes
    fn is_subtype(&self, sub: &str, sup: &str) -> bool;
}

/// Hierarchy that knows only identity and the root object type
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHierarchy;

impl TypeHierarchy for NoHierarchy {
    fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        sub == sup || sup == OBJECT_TYPE
    }
}

/// Whether a value of type `from` may be assigned to `to`; used for bounds.
pub fn is_assignable(hierarchy: &dyn TypeHierarchy, from: &TypeRef, to: &TypeRef) -> bool {
    if to.is_object() && !from.is_primitive() {
        return true;
    }
    match (from, to) {
        (TypeRef::Primitive(a), TypeRef::Primitive(b)) => a == b,
        (TypeRef::Array(a), TypeRef::Array(b)) => is_assignable(hierarchy, a, b),
        (TypeRef::Class { name: sub, args: sub_args }, TypeRef::Class { name: sup, args: sup_args }) => {
            if sub == sup && !sup_args.is_empty() && !sub_args.is_empty() {
                sub_args.len() == sup_args.len()
                    && sup_args
                        .iter()
                        .zip(sub_args)
                        .all(|(r, b)| type_argument_matches(hierarchy, r, b))
            } else {
                hierarchy.is_subtype(sub, sup)
            }
        }
        (TypeRef::Variable { bounds, .. }, _) => {
            bounds.iter().any(|b| is_assignable(hierarchy, b, to))
        }
        (_, TypeRef::Variable { bounds, .. }) => {
            bounds.iter().all(|b| is_assignable(hierarchy, from, b))
        }
        _ => false,
    }
}

/// Whether a bean exposing `bean_type` satisfies the `required` type.
///
/// Raw required types match a parameterized bean type only when every bean
/// type argument is unbounded or the object type. Parameterized types match
/// argument by argument: identical actual types, or a required wildcard /
/// type variable whose bounds admit the bean's argument.
pub fn is_bean_type_assignable(
    hierarchy: &dyn TypeHierarchy,
    required: &TypeRef,
    bean_type: &TypeRef,
) -> bool {
    match (required, bean_type) {
        (
            TypeRef::Class { name: req, args: req_args },
            TypeRef::Class { name: bean, args: bean_args },
        ) if req == bean => {
            if req_args.is_empty() {
                bean_args
                    .iter()
                    .all(|a| a.is_object() || (a.is_variable() && a.is_unbounded()))
            } else if bean_args.is_empty() {
                req_args.iter().all(|a| a.is_object() || a.is_unbounded())
            } else {
                req_args.len() == bean_args.len()
                    && req_args
                        .iter()
                        .zip(bean_args)
                        .all(|(r, b)| type_argument_matches(hierarchy, r, b))
            }
        }
        (TypeRef::Primitive(a), TypeRef::Primitive(b)) => a == b,
        (TypeRef::Array(r), TypeRef::Array(b)) => is_bean_type_assignable(hierarchy, r, b),
        _ => false,
    }
}

fn type_argument_matches(hierarchy: &dyn TypeHierarchy, required: &TypeRef, bean: &TypeRef) -> bool {
    match required {
        TypeRef::Wildcard { upper, lower } => {
            let bean_bounds = upper_bounds(bean);
            upper
                .iter()
                .all(|u| bean_bounds.iter().any(|b| is_assignable(hierarchy, b, u)))
                && (bean.is_variable() && lower.is_empty()
                    || lower.iter().all(|l| is_assignable(hierarchy, l, bean)))
        }
        TypeRef::Variable { bounds, .. } => {
            let bean_bounds = upper_bounds(bean);
            bounds
                .iter()
                .all(|rb| bean_bounds.iter().any(|b| is_assignable(hierarchy, b, rb)))
        }
        // Actual type arguments are invariant
        _ => required == bean,
    }
}

fn upper_bounds(ty: &TypeRef) -> Vec<TypeRef> {
    match ty {
        TypeRef::Variable { bounds, .. } | TypeRef::Wildcard { upper: bounds, .. } if !bounds.is_empty() => {
            bounds.clone()
        }
        TypeRef::Variable { .. } | TypeRef::Wildcard { .. } => vec![TypeRef::object()],
        other => vec![other.clone()],
    }
}

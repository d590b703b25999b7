//! Typesafe matching of a candidate bean against a required type and
//! qualifier set. Pure predicates, no registry access.

use crate::container::qualifier::{qualifiers_match, Qualifier};
use crate::container::types::{is_bean_type_assignable, NoHierarchy, TypeHierarchy, TypeRef};

/// Match without subtype knowledge: wildcard and type-variable bounds only
/// accept identical classes and the object type.
pub fn matches(
    required_type: &TypeRef,
    required_qualifiers: &[Qualifier],
    candidate_types: &[TypeRef],
    candidate_qualifiers: &[Qualifier],
) -> bool {
    matches_in(
        &NoHierarchy,
        required_type,
        required_qualifiers,
        candidate_types,
        candidate_qualifiers,
    )
}

/// Match using `hierarchy` for bound checks
pub fn matches_in(
    hierarchy: &dyn TypeHierarchy,
    required_type: &TypeRef,
    required_qualifiers: &[Qualifier],
    candidate_types: &[TypeRef],
    candidate_qualifiers: &[Qualifier],
) -> bool {
    type_matches(hierarchy, required_type, candidate_types)
        && qualifiers_match(required_qualifiers, candidate_qualifiers)
}

/// Whether any candidate API type satisfies the required type
pub fn type_matches(
    hierarchy: &dyn TypeHierarchy,
    required_type: &TypeRef,
    candidate_types: &[TypeRef],
) -> bool {
    candidate_types
        .iter()
        .any(|t| is_bean_type_assignable(hierarchy, required_type, t))
}

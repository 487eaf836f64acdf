//! Overload resolution.
//!
//! Candidates are tried in registration order and the first one that
//! accepts the arguments wins. There is no best-match scoring: callers
//! that register overlapping overloads get the earliest one.

use langbridge_common::protocol::{Argument, NoMatchError, TypeTag};

/// How an endpoint wants its constructors and methods matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strictness {
    /// Every parameter tag must equal the argument tag, except `any`
    #[default]
    Strict,
    /// Parameter count alone decides
    Loose,
}

impl Strictness {
    pub fn from_strict_types(strict_types: bool) -> Self {
        if strict_types {
            Strictness::Strict
        } else {
            Strictness::Loose
        }
    }
}

/// Whether one parameter list accepts `arguments` under `strictness`.
pub fn matches(parameters: &[TypeTag], arguments: &[Argument], strictness: Strictness) -> bool {
    if parameters.len() != arguments.len() {
        return false;
    }
    match strictness {
        Strictness::Loose => true,
        Strictness::Strict => parameters
            .iter()
            .zip(arguments)
            .all(|(param, arg)| param.accepts(&arg.tag)),
    }
}

/// Picks the first candidate that accepts `arguments`.
///
/// # Errors
///
/// Returns a [`NoMatchError`] carrying the arguments and every candidate
/// when nothing matches.
///
/// # Example
///
/// ```
/// use langbridge_broker::resolver::{resolve, Strictness};
/// use langbridge_common::protocol::{Argument, TypeTag};
///
/// let int = [TypeTag::Int];
/// let string = [TypeTag::String];
/// let candidates = [&int[..], &string[..]];
/// let args = [Argument::from("hi")];
///
/// assert_eq!(resolve(&candidates, &args, Strictness::Strict).unwrap(), 1);
/// assert_eq!(resolve(&candidates, &args, Strictness::Loose).unwrap(), 0);
/// ```
pub fn resolve(
    candidates: &[&[TypeTag]],
    arguments: &[Argument],
    strictness: Strictness,
) -> Result<usize, NoMatchError> {
    candidates
        .iter()
        .position(|parameters| matches(parameters, arguments, strictness))
        .ok_or_else(|| {
            NoMatchError::new(
                arguments.to_vec(),
                candidates.iter().map(|c| c.to_vec()).collect(),
            )
        })
}

/// Re-tags arguments with the chosen signature's parameter tags.
///
/// An `any` parameter keeps the caller's tag.
pub fn retag(arguments: &[Argument], parameters: &[TypeTag]) -> Vec<Argument> {
    arguments
        .iter()
        .zip(parameters)
        .map(|(arg, param)| match param {
            TypeTag::Any => arg.clone(),
            declared => arg.retagged(declared.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tags: &[TypeTag]) -> Vec<Argument> {
        tags.iter()
            .enumerate()
            .map(|(i, tag)| Argument::new(i.to_string(), tag.clone()))
            .collect()
    }

    #[test]
    fn test_strict_picks_exact_tag() {
        let candidates: [&[TypeTag]; 2] = [&[TypeTag::Int], &[TypeTag::String]];
        let index = resolve(&candidates, &args(&[TypeTag::String]), Strictness::Strict).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_loose_picks_first_arity_match() {
        let candidates: [&[TypeTag]; 2] = [&[TypeTag::Int], &[TypeTag::String]];
        let index = resolve(&candidates, &args(&[TypeTag::String]), Strictness::Loose).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn test_arity_mismatch_fails_in_both_modes() {
        let candidates: [&[TypeTag]; 1] = [&[TypeTag::Int, TypeTag::Int]];
        for strictness in [Strictness::Strict, Strictness::Loose] {
            let err = resolve(&candidates, &args(&[TypeTag::Int]), strictness).unwrap_err();
            assert_eq!(err.arguments.len(), 1);
            assert_eq!(err.candidates, vec![vec![TypeTag::Int, TypeTag::Int]]);
        }
    }

    #[test]
    fn test_any_parameter_matches_every_tag() {
        let candidates: [&[TypeTag]; 2] = [&[TypeTag::Int, TypeTag::Any], &[TypeTag::Any, TypeTag::Any]];
        let call = args(&[TypeTag::Int, TypeTag::Custom("Point".to_string())]);
        assert_eq!(resolve(&candidates, &call, Strictness::Strict).unwrap(), 0);

        let call = args(&[TypeTag::Bool, TypeTag::Int]);
        assert_eq!(resolve(&candidates, &call, Strictness::Strict).unwrap(), 1);
    }

    #[test]
    fn test_first_match_wins_over_later_exact_match() {
        let candidates: [&[TypeTag]; 2] = [&[TypeTag::Any], &[TypeTag::Int]];
        assert_eq!(
            resolve(&candidates, &args(&[TypeTag::Int]), Strictness::Strict).unwrap(),
            0
        );
    }

    #[test]
    fn test_empty_argument_list() {
        let candidates: [&[TypeTag]; 2] = [&[TypeTag::Int], &[]];
        assert_eq!(resolve(&candidates, &[], Strictness::Strict).unwrap(), 1);
    }

    #[test]
    fn test_no_candidates() {
        let err = resolve(&[], &args(&[TypeTag::Int]), Strictness::Loose).unwrap_err();
        assert!(err.candidates.is_empty());
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let candidates: [&[TypeTag]; 3] = [
            &[TypeTag::Float],
            &[TypeTag::Int],
            &[TypeTag::Any],
        ];
        let call = args(&[TypeTag::Int]);
        let first = resolve(&candidates, &call, Strictness::Strict).unwrap();
        for _ in 0..100 {
            assert_eq!(resolve(&candidates, &call, Strictness::Strict).unwrap(), first);
        }
    }

    #[test]
    fn test_retag_uses_declared_tags_except_any() {
        let call = vec![Argument::from("5"), Argument::from(true)];
        let retagged = retag(&call, &[TypeTag::Int, TypeTag::Any]);
        assert_eq!(retagged[0], Argument::new("5", TypeTag::Int));
        assert_eq!(retagged[1], Argument::new("true", TypeTag::Bool));
    }

    #[test]
    fn test_strictness_from_flag() {
        assert_eq!(Strictness::from_strict_types(true), Strictness::Strict);
        assert_eq!(Strictness::from_strict_types(false), Strictness::Loose);
        assert_eq!(Strictness::default(), Strictness::Strict);
    }
}

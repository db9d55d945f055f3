//! Test selection filters.
//!
//! Test names have the form `<group>.<case>`. Two filter syntaxes are
//! produced from the same list of names:
//!
//! - the KIF scenario filter (`NAME:a|b|c`), which matches on case names only;
//! - the GTest filter (`a.x:b.y`), which matches on full names.
//!
//! Both can be inverted to match everything *except* the given tests, which is
//! how a crashed run is resumed.

/// Prefix of a case name that marks the test as flaky.
pub const FLAKY_MARKER: &str = "FLAKY_";

/// Returns the case part of `<group>.<case>`, or `None` for ungrouped names.
pub fn case_name(test: &str) -> Option<&str> {
    test.split_once('.').map(|(_, case)| case)
}

/// Returns true if the test's case name carries the [`FLAKY_MARKER`].
///
/// Failures of such tests are reported separately and never fail a run.
pub fn is_flaky(test: &str) -> bool {
    case_name(test).is_some_and(|case| case.starts_with(FLAKY_MARKER))
}

/// Builds a KIF scenario filter for the given tests.
///
/// The group prefix of every name is dropped, so `KIF.a` and `KIF.b` become
/// `NAME:a|b`. With `invert` set the result is `-NAME:a|b`.
pub fn build_name_filter<S: AsRef<str>>(tests: &[S], invert: bool) -> String {
    let joined = tests
        .iter()
        .map(|test| {
            let test = test.as_ref();
            case_name(test).unwrap_or(test)
        })
        .collect::<Vec<_>>()
        .join("|");

    if invert {
        format!("-NAME:{}", joined)
    } else {
        format!("NAME:{}", joined)
    }
}

/// Builds a value for `--gtest_filter` matching the given tests.
///
/// e.g. `a.x:b.y`, or `-a.x:b.y` to match everything else.
pub fn build_gtest_filter<S: AsRef<str>>(tests: &[S], invert: bool) -> String {
    let joined = tests
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(":");

    if invert {
        format!("-{}", joined)
    } else {
        joined
    }
}

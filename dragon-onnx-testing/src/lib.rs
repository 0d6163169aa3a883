//! Internal testing utilities for the dragon-onnx crates.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// Utility for writing table-driven tests.
///
/// Define a `Debug` struct, conventionally named `Case`, holding the inputs
/// and expected results of one test. Collect the cases into an array or `Vec`
/// and call `test_each` with the test body. Every case is run, even if an
/// earlier one fails, and the failing cases are reported together.
///
/// ```
/// use dragon_onnx_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     name: &'static str,
///     expected: &'static str,
/// }
///
/// let cases = [
///     Case { name: "x", expected: "x" },
///     Case { name: "x/Version_1", expected: "x" },
/// ];
///
/// cases.test_each(|case| {
///     let base = case.name.split("/Version_").next().unwrap();
///     assert_eq!(base, case.expected);
/// });
/// ```
///
/// Test cases and the values captured by the test closure must be
/// [unwind safe](std::panic::UnwindSafe). Wrap values which are not with
/// [`AssertUnwindSafe`](std::panic::AssertUnwindSafe), or construct them
/// inside the test body.
pub trait TestCases {
    type Case;

    /// Run `test` with a reference to each case, catching panics.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Run `test` with each case passed by value.
    ///
    /// Each case is formatted before the test runs so that it can be
    /// reported if the test panics.
    fn test_each_value(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe;
}

fn report_failures<T: Debug>(failures: &[T]) {
    assert!(
        failures.is_empty(),
        "{} test cases failed: {:?}",
        failures.len(),
        failures
    );
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe,
    {
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .collect();
        report_failures(&failures);
    }

    fn test_each_value(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe,
    {
        let test = &test;
        let failures: Vec<String> = self
            .into_iter()
            .filter_map(|case| {
                let desc = format!("{:?}", case);
                std::panic::catch_unwind(move || test(case))
                    .is_err()
                    .then_some(desc)
            })
            .collect();
        report_failures(&failures);
    }
}

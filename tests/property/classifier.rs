// tests/property/classifier.rs

use proptest::prelude::*;

use pipechain::classify::{FailureClassifier, Verdict};

fn classifier() -> FailureClassifier {
    FailureClassifier::new(["could not connect to server", "connection refused"], 2000)
}

proptest! {
    #[test]
    fn exit_zero_is_always_success(out in ".{0,200}", err in ".{0,200}") {
        prop_assert_eq!(classifier().classify(0, &out, &err), Verdict::Success);
    }

    #[test]
    fn signal_near_the_end_is_transient(
        code in prop::sample::select(vec![1, 2, 127, -1]),
        prefix in "[a-z ]{0,300}",
        upper in any::<bool>(),
        in_stderr in any::<bool>(),
    ) {
        let signal = if upper { "CONNECTION REFUSED" } else { "connection refused" };
        let text = format!("{prefix}{signal}\n");
        let (out, err) = if in_stderr { ("", text.as_str()) } else { (text.as_str(), "") };

        prop_assert_eq!(classifier().classify(code, out, err), Verdict::Transient);
    }

    // Output without any signal phrase never classifies as transient.
    #[test]
    fn plain_failures_are_permanent(code in 1i32..256, out in "[0-9 ]{0,200}", err in "[0-9 ]{0,200}") {
        prop_assert_eq!(classifier().classify(code, &out, &err), Verdict::Permanent);
    }
}

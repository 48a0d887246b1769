//! Property-based tests for the command builder
//!
//! These tests use proptest to verify the flag-emission rules across many
//! randomly generated option sets, catching edge cases that hand-written
//! tests might miss.

use proptest::prelude::*;
use sdccc_harness::{OptionValue, build_command};

/// Distinct option names: random lowercase stem plus a unique index suffix.
fn named<V: Clone>(stems: &[String], value: impl Fn(usize) -> V) -> Vec<(String, V)> {
    stems
        .iter()
        .enumerate()
        .map(|(i, stem)| (format!("{stem}{i}"), value(i)))
        .collect()
}

proptest! {
    #[test]
    fn suppressed_options_emit_nothing(stems in prop::collection::vec("[a-z]{1,8}", 1..6)) {
        let options = named(&stems, |i| {
            if i % 2 == 0 {
                OptionValue::Switch(false)
            } else {
                OptionValue::Absent
            }
        });
        prop_assert!(build_command(&[], &options).is_empty());
    }

    #[test]
    fn true_switches_emit_exactly_one_bare_flag(stems in prop::collection::vec("[a-z]{1,8}", 1..6)) {
        let options = named(&stems, |_| OptionValue::Switch(true));
        let command = build_command(&[], &options);

        prop_assert_eq!(command.len(), options.len());
        for (name, _) in &options {
            let flag = format!("--{name}");
            prop_assert_eq!(command.iter().filter(|t| **t == flag).count(), 1);
        }
    }

    #[test]
    fn sequences_repeat_the_flag_per_element_in_order(
        values in prop::collection::vec("[a-z0-9]{1,6}", 0..8),
    ) {
        let options = vec![("device".to_string(), OptionValue::Sequence(values.clone()))];
        let command = build_command(&[], &options);

        prop_assert_eq!(command.len(), values.len() * 2);
        for (i, value) in values.iter().enumerate() {
            prop_assert_eq!(&command[i * 2], "--device");
            prop_assert_eq!(&command[i * 2 + 1], value);
        }
    }

    #[test]
    fn positionals_precede_named_options_in_original_order(
        positional in prop::collection::vec("[a-z]{1,6}", 0..4),
        value in "[a-z]{1,6}",
    ) {
        let options = vec![("key".to_string(), OptionValue::Scalar(value.clone()))];
        let command = build_command(&positional, &options);

        prop_assert_eq!(&command[..positional.len()], &positional[..]);
        prop_assert_eq!(&command[positional.len()..], &["--key".to_string(), value][..]);
    }

    #[test]
    fn scalars_emit_flag_then_value(
        stems in prop::collection::vec("[a-z]{1,8}", 1..6),
        values in prop::collection::vec("[a-z0-9]{1,6}", 6),
    ) {
        let options = named(&stems, |i| OptionValue::Scalar(values[i].clone()));
        let command = build_command(&[], &options);

        prop_assert_eq!(command.len(), options.len() * 2);
        for (i, (name, _)) in options.iter().enumerate() {
            prop_assert_eq!(&command[i * 2], &format!("--{name}"));
            prop_assert_eq!(&command[i * 2 + 1], &values[i]);
        }
    }
}

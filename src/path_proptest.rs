//! Property-based tests for directory naming, dot-path values and default
//! injection.

#[cfg(test)]
mod proptest_tests {
    use std::collections::BTreeMap;

    use crate::generator::apply_defaults;
    use crate::metafile::{MetaDocument, ValueSchemaEntry};
    use crate::path::{sanitize_url, working_copy_dir_name};
    use crate::values::{Value, Values};
    use proptest::prelude::*;

    fn dot_key() -> impl Strategy<Value = String> {
        "[a-z]{1,5}(\\.[a-z]{1,5}){0,3}"
    }

    proptest! {
        /// Sanitised URLs never contain path separators or colons.
        #[test]
        fn sanitize_url_is_a_single_path_segment(input in ".*") {
            let result = sanitize_url(&input);
            prop_assert!(!result.contains('/'), "'/' in {:?} from {:?}", result, input);
            prop_assert!(!result.contains(':'), "':' in {:?} from {:?}", result, input);
        }

        #[test]
        fn sanitize_url_is_idempotent(input in ".*") {
            let once = sanitize_url(&input);
            prop_assert_eq!(sanitize_url(&once), once);
        }

        /// The scheme never reaches the directory name, whatever its case.
        #[test]
        fn sanitize_url_ignores_scheme(
            scheme in prop::sample::select(vec!["http://", "https://", "HTTPS://", "Http://"]),
            rest in "[a-z0-9][a-z0-9./-]{0,40}",
        ) {
            let with_scheme = format!("{}{}", scheme, rest);
            prop_assert_eq!(sanitize_url(&with_scheme), sanitize_url(&rest));
        }

        #[test]
        fn working_copy_names_end_with_correlation_id(
            url in "https://[a-z]{1,8}\\.[a-z]{2,3}/[a-z/]{1,20}",
            branch in "[a-z0-9/._-]{1,20}",
            cid in "[a-f0-9-]{8,36}",
        ) {
            let name = working_copy_dir_name(&url, &branch, &cid);
            let suffix = format!("_{}", cid);
            prop_assert!(name.ends_with(&suffix));
            prop_assert!(!name.contains('/'));
        }

        /// A value set at a dot path reads back unchanged.
        #[test]
        fn set_then_get(key in dot_key(), value in any::<i64>()) {
            let mut values = Values::new();
            values.set(&key, Value::Integer(value));
            prop_assert_eq!(values.get(&key), Some(&Value::Integer(value)));
            prop_assert!(values.contains(&key));
        }

        /// Keys under different top-level names do not disturb each other.
        #[test]
        fn set_leaves_siblings_alone(
            first in dot_key(),
            second in dot_key(),
            a in any::<i64>(),
            b in any::<i64>(),
        ) {
            let first_root = first.split('.').next().unwrap_or_default();
            let second_root = second.split('.').next().unwrap_or_default();
            prop_assume!(first_root != second_root);

            let mut values = Values::new();
            values.set(&first, Value::Integer(a));
            values.set(&second, Value::Integer(b));
            prop_assert_eq!(values.get(&first), Some(&Value::Integer(a)));
            prop_assert_eq!(values.get(&second), Some(&Value::Integer(b)));
        }

        /// Injecting defaults twice yields the same values as injecting once,
        /// and never overrides a value that was provided.
        #[test]
        fn apply_defaults_is_idempotent(
            schema in prop::collection::btree_map(dot_key(), prop::option::of(any::<i64>()), 0..8),
            provided in prop::collection::btree_map("[a-z]{1,5}", any::<i64>(), 0..4),
        ) {
            let values_schema: BTreeMap<String, ValueSchemaEntry> = schema
                .iter()
                .map(|(key, default)| {
                    let entry = ValueSchemaEntry {
                        value_type: "integer".to_string(),
                        default: default.map(Value::Integer),
                        ..Default::default()
                    };
                    (key.clone(), entry)
                })
                .collect();
            let meta = MetaDocument {
                values_schema,
                ..Default::default()
            };

            let mut once = Values::new();
            for (key, value) in &provided {
                once.set(key, Value::Integer(*value));
            }
            let original = once.clone();
            apply_defaults(&meta, &mut once, "prop");
            let mut twice = once.clone();
            apply_defaults(&meta, &mut twice, "prop");

            prop_assert_eq!(&once, &twice);
            for (key, value) in &provided {
                if !schema.keys().any(|k| k.starts_with(&format!("{}.", key))) {
                    prop_assert_eq!(once.get(key), original.get(key));
                    prop_assert_eq!(once.get(key), Some(&Value::Integer(*value)));
                }
            }
        }

        /// Merging an empty document changes nothing.
        #[test]
        fn merge_empty_is_identity(
            entries in prop::collection::btree_map(dot_key(), any::<i64>(), 0..6),
        ) {
            let mut values = Values::new();
            for (key, value) in &entries {
                values.set(key, Value::Integer(*value));
            }
            let before = values.clone();
            values.merge(Values::new());
            prop_assert_eq!(values, before);
        }
    }
}

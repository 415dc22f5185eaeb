//! Newline-separated select options.

/// Merge `extra` option lines into `current` and make sure `required` is
/// present, preserving existing order.
///
/// Blank extra lines and lines already present are skipped. Existing lines are
/// kept as they are.
pub fn merge_options(current: Option<&str>, extra: Option<&str>, required: &str) -> String {
    let mut options: Vec<&str> = match current {
        Some(current) if !current.is_empty() => current.split('\n').collect(),
        _ => Vec::new(),
    };

    for line in extra.into_iter().flat_map(|e| e.split('\n')) {
        if !line.trim().is_empty() && !options.contains(&line) {
            options.push(line);
        }
    }

    if !options.contains(&required) {
        options.push(required);
    }

    options.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn appends_required_option() {
        assert_eq!(
            merge_options(Some("\nJournal Entry\nSales Invoice"), None, "Account Closing Voucher"),
            "\nJournal Entry\nSales Invoice\nAccount Closing Voucher"
        );
    }

    #[test]
    fn empty_field_gets_only_required() {
        assert_eq!(merge_options(None, None, "X"), "X");
        assert_eq!(merge_options(Some(""), Some("\n  \n"), "X"), "X");
    }

    #[test]
    fn setter_lines_are_merged_without_duplicates() {
        assert_eq!(
            merge_options(Some("A\nB"), Some("B\nC\n\nC\nX"), "X"),
            "A\nB\nC\nX"
        );
    }

    #[test]
    fn required_already_present_is_not_repeated() {
        assert_eq!(merge_options(Some("X\nA"), None, "X"), "X\nA");
    }

    proptest! {
        #[test]
        fn merging_twice_changes_nothing(
            current in proptest::collection::vec("[A-C ]{0,3}", 0..5),
            extra in proptest::collection::vec("[A-D ]{0,3}", 0..5),
        ) {
            let current = current.join("\n");
            let extra = extra.join("\n");
            let once = merge_options(Some(&current), Some(&extra), "Account Closing Voucher");
            let twice = merge_options(Some(&once), Some(&extra), "Account Closing Voucher");
            prop_assert_eq!(&twice, &once);
            prop_assert_eq!(merge_options(Some(&once), None, "Account Closing Voucher"), once.clone());
            prop_assert!(once.split('\n').any(|o| o == "Account Closing Voucher"));
        }
    }
}

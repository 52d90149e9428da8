//! The built-in filter catalog.
//!
//! The catalog is a fixed, ordered table. The identity filter is always the
//! first entry and is the default selection of every editor session.

use std::sync::OnceLock;

use vidfeed_feed_model::error::ModelError;
use vidfeed_feed_model::filter::{FilterExpression, FilterOp, FilterSpec};

fn catalog() -> &'static [FilterSpec] {
    static CATALOG: OnceLock<Vec<FilterSpec>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        use FilterOp::*;
        vec![
            FilterSpec::identity(),
            FilterSpec::new(
                "vivid",
                FilterExpression::new(vec![Saturate(1.6), Contrast(1.1)]),
            ),
            FilterSpec::new(
                "noir",
                FilterExpression::new(vec![Grayscale(1.0), Contrast(1.4)]),
            ),
            FilterSpec::new(
                "vintage",
                FilterExpression::new(vec![Sepia(0.5), Contrast(1.1), Saturate(0.9)]),
            ),
            FilterSpec::new(
                "warm",
                FilterExpression::new(vec![Sepia(0.25), Saturate(1.2), HueRotate(-10.0)]),
            ),
            FilterSpec::new(
                "cool",
                FilterExpression::new(vec![HueRotate(15.0), Saturate(1.1), Brightness(1.05)]),
            ),
            FilterSpec::new(
                "dreamy",
                FilterExpression::new(vec![Brightness(1.1), Contrast(0.9), Saturate(1.3)]),
            ),
            FilterSpec::new(
                "cyber",
                FilterExpression::new(vec![HueRotate(180.0), Saturate(1.5), Contrast(1.2)]),
            ),
            FilterSpec::new("invert", FilterExpression::new(vec![Invert(1.0)])),
        ]
    })
}

/// All catalog entries in display order.
pub fn list_filters() -> &'static [FilterSpec] {
    catalog()
}

/// Look up a filter by name (case-insensitive).
pub fn get_filter(name: &str) -> Result<&'static FilterSpec, ModelError> {
    catalog()
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| ModelError::FilterNotFound {
            name: name.to_string(),
        })
}

/// The identity filter.
pub fn identity() -> &'static FilterSpec {
    &catalog()[0]
}

/// Look up a filter, falling back to identity for unknown names.
pub fn get_or_identity(name: &str) -> &'static FilterSpec {
    get_filter(name).unwrap_or_else(|_| {
        tracing::warn!(filter = name, "Unknown filter; using identity");
        identity()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_first_and_empty() {
        let first = &list_filters()[0];
        assert_eq!(first.name, FilterSpec::IDENTITY_NAME);
        assert!(first.expression.is_identity());
        assert_eq!(identity(), first);
    }

    #[test]
    fn listing_is_stable_and_unique() {
        let a: Vec<_> = list_filters().iter().map(|f| f.name.clone()).collect();
        let b: Vec<_> = list_filters().iter().map(|f| f.name.clone()).collect();
        assert_eq!(a, b);

        let mut dedup = a.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), a.len());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(get_filter("NOIR").unwrap().name, "noir");
    }

    #[test]
    fn unknown_filter_is_not_found_and_defaults_to_identity() {
        let err = get_filter("sparkle").unwrap_err();
        assert_eq!(
            err,
            ModelError::FilterNotFound {
                name: "sparkle".to_string()
            }
        );
        assert!(get_or_identity("sparkle").expression.is_identity());
    }

    #[test]
    fn every_entry_round_trips_through_css_syntax() {
        for spec in list_filters() {
            let css = spec.expression.to_string();
            let parsed: FilterExpression = css.parse().unwrap();
            assert_eq!(parsed.ops().len(), spec.expression.ops().len(), "{css}");
        }
    }
}

//! Property-based tests using proptest.
//!
//! These verify the invariants the loop and the status registry lean on:
//! sequence ordering must be a total order per encoding, the wire encoding
//! must be unambiguous, and record applicability must be stable.

use proptest::prelude::*;
use table_replicator::{ChangeRecord, Operation, RowAttributes, Sequence, SkipReason};

// =============================================================================
// Sequence Ordering Properties
// =============================================================================

proptest! {
    /// Counter sequences order exactly like their integers.
    #[test]
    fn counter_ordering_matches_integer_ordering(a in any::<i64>(), b in any::<i64>()) {
        let sa = Sequence::Counter(a);
        let sb = Sequence::Counter(b);
        prop_assert_eq!(sa.cmp(&sb), a.cmp(&b));
    }

    /// Log-position sequences order exactly like their byte strings.
    #[test]
    fn log_position_ordering_matches_bytes(
        a in proptest::collection::vec(any::<u8>(), 0..16),
        b in proptest::collection::vec(any::<u8>(), 0..16),
    ) {
        let sa = Sequence::LogPosition(a.clone());
        let sb = Sequence::LogPosition(b.clone());
        prop_assert_eq!(sa.cmp(&sb), a.cmp(&b));
    }

    /// Ordering is transitive within an encoding.
    #[test]
    fn counter_ordering_transitive(a in any::<i64>(), b in any::<i64>(), c in any::<i64>()) {
        let (sa, sb, sc) = (Sequence::Counter(a), Sequence::Counter(b), Sequence::Counter(c));
        if sa <= sb && sb <= sc {
            prop_assert!(sa <= sc);
        }
    }

    /// Equal sequences compare equal both ways.
    #[test]
    fn sequence_equality_symmetric(a in any::<i64>()) {
        let sa = Sequence::Counter(a);
        let sb = Sequence::Counter(a);
        prop_assert_eq!(&sa, &sb);
        prop_assert_eq!(sa.cmp(&sb), std::cmp::Ordering::Equal);
    }
}

// =============================================================================
// Wire Encoding Properties
// =============================================================================

proptest! {
    /// Counter display is the plain decimal and parses back losslessly.
    #[test]
    fn counter_display_roundtrip(n in any::<i64>()) {
        let displayed = Sequence::Counter(n).to_string();
        prop_assert_eq!(displayed.parse::<i64>().unwrap(), n);
    }

    /// Log position display is lowercase hex, two chars per byte.
    #[test]
    fn log_position_display_is_hex(bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
        let displayed = Sequence::LogPosition(bytes.clone()).to_string();
        prop_assert_eq!(displayed.len(), bytes.len() * 2);
        prop_assert!(displayed.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    /// Display order agrees with sequence order for equal-length positions,
    /// so the status document's last_lsn is comparable as text.
    #[test]
    fn log_position_display_preserves_order(
        a in proptest::collection::vec(any::<u8>(), 8),
        b in proptest::collection::vec(any::<u8>(), 8),
    ) {
        let sa = Sequence::LogPosition(a);
        let sb = Sequence::LogPosition(b);
        let (da, db) = (sa.to_string(), sb.to_string());
        prop_assert_eq!(sa.cmp(&sb), da.cmp(&db));
    }
}

// =============================================================================
// Record Applicability Properties
// =============================================================================

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::Insert),
        Just(Operation::Update),
        Just(Operation::Delete),
    ]
}

fn arb_attributes() -> impl Strategy<Value = RowAttributes> {
    (
        proptest::option::of("[a-z]{1,12}"),
        proptest::option::of("[a-z]{1,8}@example\\.com"),
    )
        .prop_map(|(name, email)| RowAttributes {
            name,
            email,
            created_at: None,
            updated_at: None,
        })
}

proptest! {
    /// A record without an entity id is never applicable, whatever else
    /// it carries.
    #[test]
    fn missing_entity_id_always_skips(
        op in arb_operation(),
        attributes in arb_attributes(),
        seq in any::<i64>(),
    ) {
        let record = ChangeRecord {
            sequence: Sequence::Counter(seq),
            operation: op,
            entity_id: None,
            attributes,
        };
        prop_assert_eq!(record.check_applicable(), Some(SkipReason::MissingEntityId));
    }

    /// A delete with an entity id is always applicable; attributes are
    /// irrelevant to it.
    #[test]
    fn delete_with_entity_id_always_applies(
        entity_id in any::<i64>(),
        attributes in arb_attributes(),
    ) {
        let record = ChangeRecord {
            sequence: Sequence::Counter(1),
            operation: Operation::Delete,
            entity_id: Some(entity_id),
            attributes,
        };
        prop_assert_eq!(record.check_applicable(), None);
    }

    /// An upsert is applicable exactly when it carries at least one
    /// attribute.
    #[test]
    fn upsert_applicability_tracks_attribute_presence(
        entity_id in any::<i64>(),
        attributes in arb_attributes(),
        is_insert in any::<bool>(),
    ) {
        let operation = if is_insert { Operation::Insert } else { Operation::Update };
        let empty = attributes.is_empty();
        let record = ChangeRecord {
            sequence: Sequence::Counter(1),
            operation,
            entity_id: Some(entity_id),
            attributes,
        };
        if empty {
            prop_assert_eq!(record.check_applicable(), Some(SkipReason::EmptyAttributes));
        } else {
            prop_assert_eq!(record.check_applicable(), None);
        }
    }
}

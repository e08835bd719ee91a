use chrono::DateTime;
use lodestone::collection::ObjectId;
use lodestone::common::{compare_values, values_equal, Value};
use lodestone::errors::ErrorKind;
use lodestone::{doc, val};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::cmp::Ordering;

#[ctor::ctor]
fn init() {
    colog::init();
}

fn object_id(last: u8) -> Value {
    let mut bytes = [0u8; 12];
    bytes[11] = last;
    val!(ObjectId::from_bytes(bytes))
}

fn date(millis: i64) -> Value {
    val!(DateTime::from_timestamp_millis(millis).unwrap())
}

/// One strictly ascending list spanning every ordered type.
fn ascending() -> Vec<Value> {
    vec![
        Value::Null,
        val!(-5),
        val!(1.5),
        val!(2),
        val!(100),
        val!(""),
        val!("B"),
        val!("a"),
        val!("ab"),
        val!(doc! {}),
        val!(doc! { a: 1 }),
        val!(doc! { a: 1, b: 1 }),
        val!(doc! { a: 2 }),
        val!(doc! { b: 0 }),
        Value::Array(vec![]),
        Value::Array(vec![val!(1)]),
        Value::Array(vec![val!(1), val!(2)]),
        Value::Array(vec![val!(2)]),
        Value::binary(vec![9]),
        Value::binary(vec![0, 0]),
        Value::binary(vec![0, 1]),
        object_id(1),
        object_id(2),
        val!(false),
        val!(true),
        date(0),
        date(1_000),
    ]
}

#[test]
fn test_compare_is_a_total_order() {
    let values = ascending();
    for (i, a) in values.iter().enumerate() {
        for (j, b) in values.iter().enumerate() {
            let ordering = compare_values(a, b).unwrap();
            assert_eq!(ordering, i.cmp(&j), "comparing {} with {}", a, b);
        }
    }
}

#[test]
fn test_sorting_shuffled_values_restores_order() {
    let expected = ascending();
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..20 {
        let mut values = expected.clone();
        values.shuffle(&mut rng);
        values.sort_by(|a, b| compare_values(a, b).unwrap());
        assert!(values.iter().zip(&expected).all(|(a, b)| values_equal(a, b, true)));
    }
}

#[test]
fn test_numbers_compare_across_representations() {
    assert_eq!(compare_values(&val!(2), &val!(2.0)).unwrap(), Ordering::Equal);
    assert_eq!(compare_values(&val!(2), &val!(2.5)).unwrap(), Ordering::Less);
    assert!(values_equal(&val!(3), &val!(3.0), true));
}

#[test]
fn test_regexes_are_not_ordered() {
    let a = Value::regex("a", "").unwrap();
    let b = Value::regex("b", "").unwrap();
    let err = compare_values(&a, &b).unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::SortError);
}

use crate::collection::ObjectId;
use crate::common::{Value, RANDOM_ID_LENGTH, UNMISTAKABLE_CHARS};
use rand::rngs::OsRng;
use rand::Rng;
use std::fmt::Debug;

/// Mints `_id` values for documents inserted without one.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Value;
}

/// Built in id strategies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdGeneration {
    /// 17 characters from an alphabet without look-alike characters.
    #[default]
    Random,
    /// A fresh [ObjectId].
    ObjectId,
    /// A random (v4) UUID in its hyphenated text form.
    Uuid,
}

impl IdGenerator for IdGeneration {
    fn next_id(&self) -> Value {
        match self {
            IdGeneration::Random => Value::String(random_id()),
            IdGeneration::ObjectId => Value::ObjectId(ObjectId::new()),
            IdGeneration::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
        }
    }
}

/// A random string id of the default length.
pub fn random_id() -> String {
    let mut rng = OsRng;
    (0..RANDOM_ID_LENGTH)
        .map(|_| UNMISTAKABLE_CHARS[rng.gen_range(0..UNMISTAKABLE_CHARS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_ids_use_the_unambiguous_alphabet() {
        let id = random_id();
        assert_eq!(id.len(), RANDOM_ID_LENGTH);
        assert!(id.bytes().all(|c| UNMISTAKABLE_CHARS.contains(&c)));
        assert!(!id.contains('0') && !id.contains('O') && !id.contains('l'));
    }

    #[test]
    fn strategies_produce_distinct_ids() {
        for strategy in [IdGeneration::Random, IdGeneration::ObjectId, IdGeneration::Uuid] {
            let ids: HashSet<String> = (0..100).map(|_| strategy.next_id().to_string()).collect();
            assert_eq!(ids.len(), 100, "{:?}", strategy);
        }
    }

    #[test]
    fn strategy_value_types() {
        assert!(IdGeneration::Random.next_id().is_string());
        assert!(IdGeneration::ObjectId.next_id().as_object_id().is_some());
        let uuid = IdGeneration::Uuid.next_id();
        assert!(uuid::Uuid::parse_str(uuid.as_str().unwrap()).is_ok());
        assert_eq!(IdGeneration::default(), IdGeneration::Random);
    }
}

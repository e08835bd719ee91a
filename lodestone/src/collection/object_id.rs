use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use std::fmt::{Debug, Display};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

const COUNTER_MASK: u32 = 0x00FF_FFFF;

/// A 12 byte object identifier, written as 24 lowercase hex digits.
///
/// Freshly generated ids are laid out as a 4 byte big endian seconds
/// timestamp, 5 bytes chosen once per process and a 3 byte counter that
/// starts at a random value, so ids minted by one process sort roughly by
/// creation time.
///
/// # Examples
///
/// ```rust,ignore
/// use lodestone::collection::ObjectId;
///
/// let id = ObjectId::new();
/// let same = ObjectId::parse(&id.to_hex())?;
/// assert_eq!(id, same);
/// ```
#[derive(PartialEq, Eq, Ord, PartialOrd, Hash, Clone, Copy)]
pub struct ObjectId {
    bytes: [u8; 12],
}

impl ObjectId {
    /// Generates a new object id.
    pub fn new() -> Self {
        let seconds = Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
        let process = PROCESS_UNIQUE.get_or_init(|| OsRng.gen::<[u8; 5]>());
        let counter = COUNTER
            .get_or_init(|| AtomicU32::new(OsRng.gen_range(0..=COUNTER_MASK)))
            .fetch_add(1, Ordering::Relaxed)
            & COUNTER_MASK;

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process);
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        ObjectId { bytes }
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        ObjectId { bytes }
    }

    /// Parses the 24 hex digit text form. Upper case digits are accepted.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidId` error if the text is not exactly 24 hex digits.
    pub fn parse(hex: &str) -> LodestoneResult<Self> {
        if hex.len() != 24 || !hex.is_ascii() {
            log::error!("Invalid object id '{}'", hex);
            return Err(LodestoneError::new(
                &format!("Invalid object id '{}': expected 24 hex digits", hex),
                ErrorKind::InvalidId,
            ));
        }

        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| {
                log::error!("Invalid object id '{}'", hex);
                LodestoneError::new(
                    &format!("Invalid object id '{}': expected 24 hex digits", hex),
                    ErrorKind::InvalidId,
                )
            })?;
        }
        Ok(ObjectId { bytes })
    }

    /// Returns true if `hex` is a valid object id text form.
    pub fn is_valid(hex: &str) -> bool {
        hex.len() == 24 && hex.chars().all(|c| c.is_ascii_hexdigit())
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Creation time encoded in the leading four bytes.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let seconds = u32::from_be_bytes([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]]);
        DateTime::from_timestamp(seconds as i64, 0).unwrap_or_default()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId(\"{}\")", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_ids_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(ObjectId::new()));
        }
    }

    #[test]
    fn test_hex_round_trip() {
        let id = ObjectId::new();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 24);
        assert_eq!(ObjectId::parse(&hex).unwrap(), id);
        assert_eq!(ObjectId::parse(&hex.to_uppercase()).unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(
            ObjectId::parse("abc").unwrap_err().kind(),
            &ErrorKind::InvalidId
        );
        assert!(ObjectId::parse("zzzzzzzzzzzzzzzzzzzzzzzz").is_err());
        assert!(ObjectId::parse("ééééééééééää").is_err());
    }

    #[test]
    fn test_is_valid() {
        assert!(ObjectId::is_valid("0123456789abcdefABCDEF01"));
        assert!(!ObjectId::is_valid("0123456789abcdefABCDEF0"));
    }

    #[test]
    fn test_timestamp_is_recent() {
        let id = ObjectId::new();
        let age = Utc::now().timestamp() - id.timestamp().timestamp();
        assert!((0..5).contains(&age));
    }

    #[test]
    fn test_display_and_debug() {
        let id = ObjectId::from_bytes([0xab; 12]);
        assert_eq!(id.to_string(), "abababababababababababab");
        assert_eq!(format!("{:?}", id), "ObjectId(\"abababababababababababab\")");
    }

    #[test]
    fn test_multithreaded_generation() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..250).map(|_| ObjectId::new()).collect::<Vec<_>>()))
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}

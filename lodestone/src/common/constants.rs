/// Name of the identity field every stored document carries.
pub const DOC_ID: &str = "_id";

pub const OP_AND: &str = "$and";
pub const OP_OR: &str = "$or";
pub const OP_NOR: &str = "$nor";
pub const OP_WHERE: &str = "$where";
pub const OP_COMMENT: &str = "$comment";

/// Top level operators that combine or annotate whole document selectors.
pub const LOGICAL_OPERATORS: [&str; 5] = [OP_AND, OP_OR, OP_NOR, OP_WHERE, OP_COMMENT];

/// Characters used by generated random string ids.
pub(crate) const UNMISTAKABLE_CHARS: &[u8] =
    b"23456789ABCDEFGHJKLMNPQRSTWXYZabcdefghijkmnopqrstuvwxyz";

/// Length of generated random string ids.
pub(crate) const RANDOM_ID_LENGTH: usize = 17;

/// Mean earth radius in meters, used for GeoJSON point distances.
pub(crate) const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

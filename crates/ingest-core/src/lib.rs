mod record;
mod balancer;
mod error;

pub use record::Record;
pub use balancer::{parse_key_suffix, Balancer, BalancerStrategy, SuffixParseError, KEY_SUFFIX_DELIMITER};
pub use error::{RecordError, Result};

pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024; // 10MB

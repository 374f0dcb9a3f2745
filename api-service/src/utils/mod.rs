pub mod pagination;
pub mod password;
pub mod validation;

pub use pagination::{paginate, Cursor, PageMeta, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use password::{hash_password, verify_password};
pub use validation::{parse_id, ValidatedJson, ValidatedQuery};

pub mod error;
pub mod extract;
pub mod response;
pub mod schema;
pub mod state;
pub mod utils;

pub use error::{ApiError, ApiResult, ErrorKind, FieldError};
pub use extract::{JsonBody, PathParams, QueryParams};
pub use response::{ApiResponse, Pagination};
pub use state::AppState;

pub mod error;
pub mod requests;
pub mod responses;
pub mod sign;


pub use error::{ErrorCode, Result, RpcError};
pub use requests::Request;
pub use responses::Response;
pub use sign::{arg_count_of, build_sign};

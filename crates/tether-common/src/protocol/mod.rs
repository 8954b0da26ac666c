pub mod error;
pub mod requests;
pub mod responses;


pub use error::{Result, RpcError, TetherError};
pub use requests::{MethodName, Request, RequestId, RpcArgs, AUTH_METHOD, BATCH_METHOD};
pub use responses::Response;

pub mod common;
pub mod core;
pub mod rpc;
pub mod store;

// Generated gRPC code
pub mod wire {
    tonic::include_proto!("columnfs.store");
}

pub use common::error::{Error, Result};
pub use store::FileStore;

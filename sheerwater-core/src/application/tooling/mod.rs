pub mod catalog;
mod connection;
mod error;
mod interface;
mod invoker;
#[cfg(test)]
pub(crate) mod testing;

pub use connection::RpcConnection;
pub use error::ToolingError;
pub use interface::ToolServerInterface;
pub use invoker::ToolInvoker;

//! Status IPC for shells and UIs: observational only

mod protocol;
mod server;

pub use protocol::{DaemonStatus, Notification, Phase, Request, Response};
pub use server::Server;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The upgrade request could not be used (bad path, missing query).
    #[error("bad connect request: {0}")]
    BadRequest(String),

    /// A read or write did not finish before its deadline.
    #[error("{0} deadline expired")]
    DeadlineExpired(&'static str),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}

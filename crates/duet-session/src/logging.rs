//! Access and error log helpers.
//!
//! Both logs go through `tracing` under fixed targets so a subscriber can
//! route them separately: `duet::access` for handled requests and
//! lifecycle events, `duet::error` for everything that went wrong.

use std::fmt::Display;

/// Records a handled request or lifecycle event.
///
/// `scope` is `"sess"` for the session socket or the room id for room
/// sockets.
pub fn access_log(uuid: &str, scope: impl Display, msg: &str) {
    tracing::info!(target: "duet::access", uuid, %scope, msg);
}

/// Records a failure. The connection is left as it is.
pub fn error_log(uuid: &str, scope: impl Display, err: impl Display) {
    tracing::warn!(target: "duet::error", uuid, %scope, error = %err);
}

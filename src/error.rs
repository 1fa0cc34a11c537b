/// Error taxonomy
///
/// Distinguishes benign, expected RPC failures (`BlockNotFound`) from ones
/// the tick controller must surface as `RPC_ERROR`, and fatal construction
/// errors that stop the binary before the tick loop ever starts.
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum RpcError {
    /// The node does not (yet, or any longer) have a block at the requested height.
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("RPC protocol error: {0}")]
    Protocol(String),

    #[error("RPC call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl RpcError {
    /// True when this failure should be swallowed silently at the top of a tick
    /// rather than emitted as `RPC_ERROR` (spec: benign race between tip advance
    /// and fetch).
    pub fn is_block_not_found(&self) -> bool {
        matches!(self, RpcError::BlockNotFound(_))
    }
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_not_found_is_classified() {
        let e = RpcError::BlockNotFound("Block not found".to_string());
        assert!(e.is_block_not_found());

        let e = RpcError::Transport("connection refused".to_string());
        assert!(!e.is_block_not_found());
    }

    #[test]
    fn display_includes_message() {
        let e = RpcError::Protocol("boom".to_string());
        assert!(e.to_string().contains("boom"));
    }
}

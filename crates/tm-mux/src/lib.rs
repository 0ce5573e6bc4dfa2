//! Terminal multiplexer backends
//!
//! This crate provides concrete implementations of the SessionMultiplexer
//! trait for the multiplexers that can host background tasks.

#[cfg(feature = "tmux")]
pub mod tmux;

use tm_mux_core::*;

/// Get the default multiplexer for the current system
pub fn default_multiplexer() -> Result<Box<dyn SessionMultiplexer + Send + Sync>, MuxError> {
    #[cfg(feature = "tmux")]
    {
        let tmux = tmux::TmuxMultiplexer::new();
        if tmux.is_available() {
            return Ok(Box::new(tmux));
        }
    }

    // Add other multiplexers here as they are implemented

    Err(MuxError::NotAvailable("No supported multiplexer found"))
}

/// Get a multiplexer by name
pub fn multiplexer_by_name(name: &str) -> Result<Box<dyn SessionMultiplexer + Send + Sync>, MuxError> {
    match name {
        #[cfg(feature = "tmux")]
        "tmux" => Ok(Box::new(tmux::TmuxMultiplexer::new())),
        // Add other multiplexers here
        _ => Err(MuxError::Other(format!(
            "Unsupported multiplexer: {}",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplexer_by_name_rejects_unknown_backend() {
        match multiplexer_by_name("zellij") {
            Err(MuxError::Other(msg)) => assert!(msg.contains("zellij")),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("zellij should not be supported"),
        }
    }

    #[cfg(feature = "tmux")]
    #[test]
    fn test_multiplexer_by_name_tmux() {
        let mux = multiplexer_by_name("tmux").unwrap();
        assert_eq!(mux.id(), "tmux");
    }
}

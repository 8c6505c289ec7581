//! Retry policy for failed recognitions
//!
//! A retry chip is offered only for transient transport failures of a
//! file-based engine that still holds the last utterance. The decision is a
//! pure function of the error message and the session's capabilities.

use crate::transcription::EngineKind;

/// Markers of an "empty result" failure, which a retry cannot fix
const EMPTY_RESULT_MARKERS: &[&str] = &["为空", "empty"];

/// Markers of a network or timeout failure
const NETWORK_MARKERS: &[&str] = &[
    "网络",
    "超时",
    "timeout",
    "timed out",
    "connect",
    "connection",
    "socket",
    "host",
    "unreachable",
    "rate",
    "too many requests",
];

/// Broad class of a recognition error message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    EmptyResult,
    Transport,
    Other,
}

pub fn classify(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if has(EMPTY_RESULT_MARKERS) {
        ErrorClass::EmptyResult
    } else if has(NETWORK_MARKERS) {
        ErrorClass::Transport
    } else {
        ErrorClass::Other
    }
}

/// Whether to offer a retry after a recognition error
pub fn should_offer_retry(message: &str, engine: EngineKind, can_retry_last: bool) -> bool {
    engine == EngineKind::File && classify(message) == ErrorClass::Transport && can_retry_last
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("Request timed out"), ErrorClass::Transport);
        assert_eq!(classify("网络异常"), ErrorClass::Transport);
        assert_eq!(classify("Connection reset by peer"), ErrorClass::Transport);
        assert_eq!(classify("识别结果为空"), ErrorClass::EmptyResult);
        assert_eq!(classify("Empty result (timeout)"), ErrorClass::EmptyResult);
        assert_eq!(classify("invalid api key"), ErrorClass::Other);
    }

    #[test]
    fn test_retry_requires_file_engine() {
        assert!(should_offer_retry("timeout", EngineKind::File, true));
        assert!(!should_offer_retry("timeout", EngineKind::Streaming, true));
    }

    #[test]
    fn test_retry_requires_buffered_audio() {
        assert!(!should_offer_retry("timeout", EngineKind::File, false));
    }

    #[test]
    fn test_no_retry_for_empty_or_other() {
        assert!(!should_offer_retry("empty result", EngineKind::File, true));
        assert!(!should_offer_retry("HTTP 401", EngineKind::File, true));
    }
}

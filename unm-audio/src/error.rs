use std::fmt;

use thiserror::Error;

/// 后端上报的原始错误码，沿用 HRESULT 风格的 32 位值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    pub const OK: ErrorCode = ErrorCode(0);
    /// 对处于错误状态的 voice/引擎发起了调用
    pub const INVALID_CALL: ErrorCode = ErrorCode(0x8896_0001);
    /// 输出设备失效（拔出、切换默认设备等）
    pub const DEVICE_INVALIDATED: ErrorCode = ErrorCode(0x8896_0004);
    pub const NOT_FOUND: ErrorCode = ErrorCode(0x8007_0490);
    pub const FAIL: ErrorCode = ErrorCode(0x8000_4005);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    /// 可以通过重建 voice 恢复的错误
    pub fn is_recoverable(self) -> bool {
        self == Self::INVALID_CALL || self == Self::DEVICE_INVALIDATED
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum MixingError {
    #[error("no audio output device")]
    NoDevice,

    #[error("mixing backend call failed ({code}): {message}")]
    Backend { code: ErrorCode, message: String },
}

impl MixingError {
    pub fn backend(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Backend { code, message: message.into() }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoDevice => ErrorCode::NOT_FOUND,
            Self::Backend { code, .. } => *code,
        }
    }
}

#[derive(Debug, Error)]
pub enum MusicError {
    #[error("streaming media subsystem is not available on this platform")]
    Unavailable,

    #[error("cannot use '{path}' as a music source: {message}")]
    Source { path: String, message: String },

    #[error("music decode failed: {0}")]
    Decode(String),

    #[error("music output device error: {0}")]
    Device(String),

    #[error("music seek failed: {0}")]
    Seek(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no playable audio track")]
    NoTrack,

    #[error("unsupported audio data: {0}")]
    Unsupported(String),

    #[error("decoder error: {0}")]
    Symphonia(#[from] symphonia::core::errors::Error),
}

/// 对外控制接口的错误
#[derive(Debug, Error)]
pub enum AudioError {
    /// 音效未加载（调用方的契约错误）
    #[error("sound effect '{0}' is not loaded")]
    NotFound(String),

    #[error("failed to load '{path}': {source}")]
    Decode {
        path: String,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    Mixing(#[from] MixingError),

    #[error(transparent)]
    Music(#[from] MusicError),
}

pub type Result<T> = std::result::Result<T, AudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_two_codes_are_recoverable() {
        assert!(ErrorCode::INVALID_CALL.is_recoverable());
        assert!(ErrorCode::DEVICE_INVALIDATED.is_recoverable());
        assert!(!ErrorCode::FAIL.is_recoverable());
        assert!(!ErrorCode::OK.is_recoverable());
    }

    #[test]
    fn error_code_formats_as_hex() {
        assert_eq!(ErrorCode::INVALID_CALL.to_string(), "0x88960001");
        assert_eq!(MixingError::NoDevice.code(), ErrorCode::NOT_FOUND);
    }
}

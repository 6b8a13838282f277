/*!
 * Error types for the fisher-subs library.
 *
 * This module contains custom error types for the different parts of the
 * subtitle pipeline, using the thiserror crate for ergonomic error definitions.
 *
 * The user-facing messages of `SubtitleError` are kept in Chinese, the language
 * the surrounding assistant UI shows them in. Messages starting with one of
 * `CHAIN_MESSAGE_PREFIXES` are recognised at the Bilibili strategy boundary and
 * passed through unchanged.
 */

use thiserror::Error;

/// Prefixes that mark a message as already user-facing
pub const CHAIN_MESSAGE_PREFIXES: [&str; 3] = ["视频字幕获取失败", "无法", "未能"];

/// Errors that can occur when talking to a platform endpoint
#[derive(Error, Debug)]
pub enum FetchError {
    /// Error when sending the request fails
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Error when the response body cannot be decoded
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Non-success HTTP status
    #[error("Endpoint responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Errors raised while retrieving subtitles for a video
#[derive(Error, Debug)]
pub enum SubtitleError {
    /// The video URL itself could not be parsed
    #[error("无法解析视频URL: {0}")]
    InvalidUrl(String),

    /// Neither a `bvid` parameter nor a path segment was found
    #[error("无法从URL中提取 BVID 或 AID")]
    IdentifierMissing,

    /// The identifier is neither BV nor AV
    #[error("无法识别的视频ID格式 (非BV或AV号)")]
    UnrecognizedIdentifier,

    /// The video-info endpoint failed
    #[error("获取视频信息失败: {0}")]
    VideoInfo(String),

    /// The video-info endpoint returned no pages
    #[error("无法获取视频的分P信息")]
    NoPages,

    /// The page-list endpoint failed
    #[error("获取视频分P列表失败: {0}")]
    PageList(String),

    /// aid or cid missing after metadata lookup
    #[error("未能成功获取视频的 AID 和 CID")]
    MissingIds,

    /// The caption-list endpoint returned a non-zero code
    #[error("视频字幕获取失败，原因： {0}")]
    CaptionApi(String),

    /// The caption-list response has no subtitle container
    #[error("视频字幕获取失败，原因：接口未返回字幕数据")]
    CaptionDataMissing,

    /// Captions exist only for logged-in sessions
    #[error("视频字幕获取失败，原因：需要登录才能获取字幕！")]
    LoginRequired,

    /// No track with a usable URL
    #[error("视频字幕获取失败，原因：该视频暂未提供有效字幕！")]
    NoValidCaptions,

    /// The caption payload has no body
    #[error("获取字幕内容失败，格式无效")]
    InvalidPayload,

    /// Wrapped error from the Bilibili strategy boundary
    #[error("处理B站字幕时出错: {0}")]
    Platform(String),

    /// The transcript service of the token-gated platform failed
    #[error("视频字幕获取失败，原因：字幕获取接口暂不可用！")]
    TranscriptUnavailable,

    /// Transport or decoding failure
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl SubtitleError {
    /// Whether the message already carries one of the chain's own prefixes
    pub fn is_user_facing(&self) -> bool {
        let message = self.to_string();
        CHAIN_MESSAGE_PREFIXES
            .iter()
            .any(|prefix| message.starts_with(prefix))
    }
}

/// Errors raised while inspecting an observed request.
///
/// These never leave the interceptor: they are logged and dropped.
#[derive(Error, Debug)]
pub enum InterceptError {
    /// The observed URL could not be resolved against the page URL
    #[error("Failed to parse caption URL '{url}': {reason}")]
    InvalidUrl {
        /// Raw URL as seen by the primitive
        url: String,
        /// Parser message
        reason: String,
    },
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from an endpoint call
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Error from subtitle retrieval
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        Self::ParseError(error.to_string())
    }
}

/// Errors raised by the YouTube transcript fetcher
#[derive(Error, Debug)]
pub enum TranscriptError {
    /// No video id could be read from the URL
    #[error("Impossible to retrieve YouTube video id from '{0}'")]
    InvalidVideoId(String),

    /// YouTube answered with a captcha page
    #[error("YouTube is receiving too many requests from this IP")]
    TooManyRequests,

    /// The watch page has no player data
    #[error("The video is no longer available ({0})")]
    VideoUnavailable(String),

    /// The watch page has no caption section
    #[error("Transcript is disabled on this video ({0})")]
    CaptionsDisabled(String),

    /// No caption track in the preferred language
    #[error("No transcripts are available in {language} for this video ({video_id})")]
    LanguageUnavailable {
        /// Requested language
        language: String,
        /// YouTube video id
        video_id: String,
    },

    /// The caption section or a track URL could not be decoded
    #[error("Malformed caption data: {0}")]
    MalformedPage(String),

    /// Transport failure
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

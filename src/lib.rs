/*!
 * # fisher-subs - authoritative subtitles for the FisherAI assistant
 *
 * A Rust library that pulls caption tracks out of video platforms which hide
 * them behind authenticated, multi-step network calls.
 *
 * ## Features
 *
 * - Observe the page's own caption requests and capture their short-lived
 *   `pot` access token
 * - Relay captured tokens to the privileged extension side over a typed
 *   message bus
 * - Retrieve subtitles for a video URL:
 *   - YouTube: transcript fetcher, using captured tokens when available
 *   - Bilibili: BV/AV resolution, page lookup, caption discovery, payload fetch
 * - Normalize captions to SRT or plain text
 *
 * ## Architecture
 *
 * - `interceptor`: page-side request observation and token store
 * - `bridge`: token relay between the page and the extension
 * - `platforms`: retrieval orchestrator and platform strategies
 * - `subtitle_format`: cue normalization and serialization
 * - `http`: request descriptors and the HTTP client seam
 * - `app_config`: configuration management
 * - `language_utils`: ISO language code utilities
 * - `file_utils`: saving rendered subtitles
 * - `errors`: custom error types
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod bridge;
pub mod errors;
pub mod file_utils;
pub mod http;
pub mod interceptor;
pub mod language_utils;
pub mod platforms;
pub mod subtitle_format;

// Re-export main types for easier usage
pub use app_config::Config;
pub use bridge::{relay_channel, BridgeMessage, ChannelRelay, RelayReceiver, TokenRegistry};
pub use errors::{AppError, FetchError, InterceptError, SubtitleError, TranscriptError};
pub use interceptor::{InterceptedToken, PageContext, PageRequestInterceptor, TokenLookup, TokenStore};
pub use platforms::{Platform, SubtitleOrchestrator};
pub use subtitle_format::{Cue, OutputFormat, SubtitleDocument};

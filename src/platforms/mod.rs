/*!
 * Subtitle retrieval orchestration.
 *
 * Picks exactly one platform strategy for a video URL, runs it and hands the
 * raw cues to the format normalizer:
 * - `youtube`: token-gated platform, transcript fetcher behind a trait
 * - `bilibili`: four-step, cookie-credentialed resolution chain
 *
 * Each call is independent: no shared mutable state, no de-duplication of
 * concurrent calls, no retries and no timeouts.
 */

use std::fmt;
use std::sync::Arc;
use log::{error, info, warn};
use url::Url;

use crate::app_config::Config;
use crate::errors::SubtitleError;
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::interceptor::TokenLookup;
use crate::subtitle_format::{OutputFormat, SubtitleDocument};

pub mod bilibili;
pub mod youtube;

pub use bilibili::BilibiliClient;
pub use youtube::{TranscriptFetcher, YoutubeTranscriptClient};

/// Supported video platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    YouTube,
    Bilibili,
}

impl Platform {
    /// Detect the platform from the URL host
    pub fn detect(video_url: &str) -> Option<Self> {
        let url = Url::parse(video_url).ok()?;
        let host = url.host_str()?.to_lowercase();

        if host.contains("youtube") || host.contains("youtu.be") {
            Some(Self::YouTube)
        } else if host.contains("bilibili") {
            Some(Self::Bilibili)
        } else {
            None
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::Bilibili => "Bilibili",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Runs the platform strategy matching a video URL
#[derive(Clone)]
pub struct SubtitleOrchestrator {
    transcripts: Arc<dyn TranscriptFetcher>,
    bilibili: BilibiliClient,
    preferred_language: Option<String>,
}

impl SubtitleOrchestrator {
    pub fn new(transcripts: Arc<dyn TranscriptFetcher>, bilibili: BilibiliClient) -> Self {
        Self {
            transcripts,
            bilibili,
            preferred_language: None,
        }
    }

    /// Language asked of the transcript fetcher; `None` takes the first track
    pub fn with_preferred_language(mut self, language: Option<String>) -> Self {
        self.preferred_language = language;
        self
    }

    /// Build the default reqwest-backed strategies from configuration
    pub fn from_config(config: &Config, tokens: Option<Arc<dyn TokenLookup>>) -> Self {
        let user_agent = Some(config.user_agent.clone());

        let youtube_http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new(None, user_agent.clone()));
        let mut transcripts = YoutubeTranscriptClient::new(youtube_http, config.youtube.watch_base_url.clone());
        if let Some(tokens) = tokens {
            transcripts = transcripts.with_tokens(tokens);
        }

        let bilibili_http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new(
            Some(config.bilibili.cookie.clone()),
            user_agent,
        ));
        let bilibili = BilibiliClient::new(bilibili_http, config.bilibili.api_base_url.clone());

        Self::new(Arc::new(transcripts), bilibili)
            .with_preferred_language(config.youtube.preferred_language.clone())
    }

    /// Retrieve the subtitle document for `video_url`.
    ///
    /// `Ok(None)` means the URL belongs to no supported platform.
    pub async fn retrieve(
        &self,
        video_url: &str,
        format: OutputFormat,
    ) -> Result<Option<SubtitleDocument>, SubtitleError> {
        let Some(platform) = Platform::detect(video_url) else {
            warn!("No subtitle strategy for {}", video_url);
            return Ok(None);
        };

        info!("Retrieving {} subtitles for {}", platform, video_url);
        let document = match platform {
            Platform::YouTube => self.retrieve_youtube(video_url, format).await?,
            Platform::Bilibili => self.bilibili.fetch_subtitles(video_url, format).await?,
        };

        info!("Retrieved {} cue(s) from {}", document.len(), platform);
        Ok(Some(document))
    }

    /// Retrieve and serialize in one go
    pub async fn extract_subtitles(
        &self,
        video_url: &str,
        format: OutputFormat,
    ) -> Result<Option<String>, SubtitleError> {
        Ok(self.retrieve(video_url, format).await?.map(|document| document.render()))
    }

    // Single attempt; any failure becomes the fixed unavailable message.
    async fn retrieve_youtube(&self, video_url: &str, format: OutputFormat) -> Result<SubtitleDocument, SubtitleError> {
        match self
            .transcripts
            .fetch_transcript(video_url, self.preferred_language.as_deref())
            .await
        {
            Ok(cues) => Ok(SubtitleDocument::from_offset_duration(&cues, format)),
            Err(e) => {
                error!("Error fetching subtitles: {}", e);
                Err(SubtitleError::TranscriptUnavailable)
            }
        }
    }
}

impl fmt::Debug for SubtitleOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubtitleOrchestrator")
            .field("bilibili", &self.bilibili)
            .field("preferred_language", &self.preferred_language)
            .finish_non_exhaustive()
    }
}

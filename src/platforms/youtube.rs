/*!
 * YouTube transcript retrieval.
 *
 * The orchestrator treats transcript fetching as a black box behind
 * `TranscriptFetcher`. `YoutubeTranscriptClient` is the bundled
 * implementation: it reads the caption track list from the watch page, picks a
 * track and parses the timedtext XML. When the page interceptor has captured a
 * `pot` token for the video, it is added to the track URL.
 */

use std::sync::Arc;
use async_trait::async_trait;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::errors::TranscriptError;
use crate::http::{AuthMode, HttpClient, PlatformRequestDescriptor, ResponseShape};
use crate::interceptor::{TokenLookup, TOKEN_PARAM};
use crate::language_utils;
use crate::subtitle_format::OffsetDurationCue;

/// Watch page of a video
pub const WATCH_PAGE: PlatformRequestDescriptor =
    PlatformRequestDescriptor::get("{base}/watch?v={video_id}", AuthMode::None, ResponseShape::Html);

/// Timedtext track, token carried in the URL when known
pub const TIMEDTEXT_TRACK: PlatformRequestDescriptor =
    PlatformRequestDescriptor::get("{url}", AuthMode::Token, ResponseShape::Xml);

// @const: Video id in watch, embed, shorts and short-link URLs
static VIDEO_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:youtube\.com/(?:[^/]+/.+/|(?:v|e(?:mbed)?|shorts)/|.*[?&]v=)|youtu\.be/)([^"&?/\s]{11})"#,
    )
    .unwrap()
});

// @const: One cue of a timedtext document
static TRANSCRIPT_ENTRY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<text start="([^"]*)" dur="([^"]*)"[^>]*>(.*?)</text>"#).unwrap()
});

/// Fetches raw transcript cues for a video URL
#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    /// `language` of `None` accepts the first available track
    async fn fetch_transcript(
        &self,
        video_url: &str,
        language: Option<&str>,
    ) -> Result<Vec<OffsetDurationCue>, TranscriptError>;
}

/// Read the 11-character video id from a URL or a bare id
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if input.len() == 11 && !input.contains(['/', '?', '&', '.', ' ']) {
        return Some(input.to_string());
    }
    VIDEO_ID_REGEX
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionsSection {
    #[serde(default)]
    player_captions_tracklist_renderer: Option<TracklistRenderer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracklistRenderer {
    #[serde(default)]
    caption_tracks: Vec<CaptionTrack>,
}

/// One entry of `captionTracks`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub base_url: String,
    #[serde(default)]
    pub language_code: String,
}

/// Caption tracks listed in a watch page
pub fn parse_caption_tracks(page: &str, video_id: &str) -> Result<Vec<CaptionTrack>, TranscriptError> {
    let Some((_, after)) = page.split_once("\"captions\":") else {
        if page.contains("class=\"g-recaptcha\"") {
            return Err(TranscriptError::TooManyRequests);
        }
        if !page.contains("\"playabilityStatus\":") {
            return Err(TranscriptError::VideoUnavailable(video_id.to_string()));
        }
        return Err(TranscriptError::CaptionsDisabled(video_id.to_string()));
    };

    let section = after.split(",\"videoDetails").next().unwrap_or(after).replacen('\n', "", 1);
    let captions: CaptionsSection = serde_json::from_str(&section)
        .map_err(|e| TranscriptError::MalformedPage(e.to_string()))?;

    let tracks = captions
        .player_captions_tracklist_renderer
        .map(|renderer| renderer.caption_tracks)
        .unwrap_or_default();

    if tracks.is_empty() {
        return Err(TranscriptError::CaptionsDisabled(video_id.to_string()));
    }
    Ok(tracks)
}

/// Cues of a timedtext XML document
pub fn parse_transcript_xml(xml: &str) -> Vec<OffsetDurationCue> {
    TRANSCRIPT_ENTRY_REGEX
        .captures_iter(xml)
        .map(|caps| OffsetDurationCue {
            offset: caps[1].parse().unwrap_or(0.0),
            duration: caps[2].parse().unwrap_or(0.0),
            text: decode_entities(&caps[3]),
        })
        .collect()
}

// Timedtext escapes twice (`&amp;#39;`), so `&amp;` goes first.
fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
}

/// Bundled transcript fetcher
#[derive(Clone)]
pub struct YoutubeTranscriptClient {
    http: Arc<dyn HttpClient>,
    watch_base: String,
    tokens: Option<Arc<dyn TokenLookup>>,
}

impl YoutubeTranscriptClient {
    pub fn new(http: Arc<dyn HttpClient>, watch_base: impl Into<String>) -> Self {
        Self {
            http,
            watch_base: watch_base.into().trim_end_matches('/').to_string(),
            tokens: None,
        }
    }

    /// Use captured `pot` tokens when building track URLs
    pub fn with_tokens(mut self, tokens: Arc<dyn TokenLookup>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    fn select_track<'a>(
        tracks: &'a [CaptionTrack],
        language: Option<&str>,
        video_id: &str,
    ) -> Result<&'a CaptionTrack, TranscriptError> {
        match language {
            None => tracks.first().ok_or_else(|| TranscriptError::CaptionsDisabled(video_id.to_string())),
            Some(language) => tracks
                .iter()
                .find(|track| language_utils::caption_language_matches(&track.language_code, language))
                .ok_or_else(|| TranscriptError::LanguageUnavailable {
                    language: language.to_string(),
                    video_id: video_id.to_string(),
                }),
        }
    }

    /// Track URL, with the captured token appended when one is known
    fn track_url(&self, track: &CaptionTrack, video_id: &str) -> Result<String, TranscriptError> {
        let token = self.tokens.as_ref().and_then(|tokens| tokens.get_token(video_id));
        let Some(token) = token else {
            return Ok(track.base_url.clone());
        };

        let mut url = Url::parse(&track.base_url).map_err(|e| TranscriptError::MalformedPage(e.to_string()))?;
        let has_token = url.query_pairs().any(|(key, _)| key == TOKEN_PARAM);
        if !has_token {
            debug!("Adding captured token to caption request for {}", video_id);
            url.query_pairs_mut()
                .append_pair(TOKEN_PARAM, &token)
                .append_pair("c", "WEB");
        }
        Ok(url.to_string())
    }
}

#[async_trait]
impl TranscriptFetcher for YoutubeTranscriptClient {
    async fn fetch_transcript(
        &self,
        video_url: &str,
        language: Option<&str>,
    ) -> Result<Vec<OffsetDurationCue>, TranscriptError> {
        let video_id = extract_video_id(video_url)
            .ok_or_else(|| TranscriptError::InvalidVideoId(video_url.to_string()))?;

        let page = WATCH_PAGE
            .fetch_text(
                self.http.as_ref(),
                &[("base", self.watch_base.as_str()), ("video_id", video_id.as_str())],
            )
            .await?;

        let tracks = parse_caption_tracks(&page, &video_id)?;
        let track = Self::select_track(&tracks, language, &video_id)?;
        let track_url = self.track_url(track, &video_id)?;

        let xml = TIMEDTEXT_TRACK
            .fetch_text(self.http.as_ref(), &[("url", track_url.as_str())])
            .await?;

        let cues = parse_transcript_xml(&xml);
        debug!("Parsed {} transcript cue(s) for {}", cues.len(), video_id);
        Ok(cues)
    }
}

impl std::fmt::Debug for YoutubeTranscriptClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoutubeTranscriptClient")
            .field("watch_base", &self.watch_base)
            .field("tokens", &self.tokens.is_some())
            .finish()
    }
}

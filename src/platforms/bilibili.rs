/*!
 * Bilibili caption retrieval.
 *
 * Four sequential steps, each needing the previous one's output:
 *
 * 1. identity extraction from the video URL (BV or AV id)
 * 2. metadata lookup for the numeric `aid` and the first page's `cid`
 * 3. caption discovery for `(aid, cid)`
 * 4. fetch of the first track with a usable URL
 *
 * Steps 2 and 3 forward the session cookie; the payload fetch does not.
 * Any failure aborts the chain, nothing is retried.
 */

use std::sync::Arc;
use log::{debug, error, info};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::errors::{FetchError, SubtitleError};
use crate::http::{AuthMode, HttpClient, PlatformRequestDescriptor, ResponseShape};
use crate::interceptor::query_param;
use crate::subtitle_format::{FromToCue, OutputFormat, SubtitleDocument};

/// Video info by BV id
pub const VIDEO_INFO: PlatformRequestDescriptor = PlatformRequestDescriptor::get(
    "{base}/x/web-interface/view?bvid={bvid}",
    AuthMode::CookieCredentialed,
    ResponseShape::Json,
);

/// Page list by AV id
pub const PAGE_LIST: PlatformRequestDescriptor = PlatformRequestDescriptor::get(
    "{base}/x/player/pagelist?aid={aid}",
    AuthMode::CookieCredentialed,
    ResponseShape::Json,
);

/// Caption tracks for one page
pub const CAPTION_LIST: PlatformRequestDescriptor = PlatformRequestDescriptor::get(
    "{base}/x/player/wbi/v2?aid={aid}&cid={cid}",
    AuthMode::CookieCredentialed,
    ResponseShape::Json,
);

/// Caption payload at a discovered track URL
pub const CAPTION_PAYLOAD: PlatformRequestDescriptor =
    PlatformRequestDescriptor::get("{url}", AuthMode::None, ResponseShape::Json);

/// Identifier scheme of a Bilibili video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaIdKind {
    Bv,
    Av,
}

/// Output of step 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaIdentifier {
    pub kind: MediaIdKind,
    /// Identifier as found in the URL
    pub raw_id: String,
    /// `aid` for AV ids; BV ids learn it in step 2
    pub numeric_id: Option<String>,
}

/// Output of step 2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMediaIdentity {
    pub kind: MediaIdKind,
    pub raw_id: String,
    /// aid
    pub numeric_id: String,
    /// cid of the first page
    pub track_id: String,
}

/// One caption track found in step 3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionTrackDescriptor {
    pub url: String,
    pub language: Option<String>,
}

/// Read the video identifier from a Bilibili URL.
///
/// A non-empty `bvid` query parameter wins over the last path segment.
pub fn extract_identity(video_url: &str) -> Result<MediaIdentifier, SubtitleError> {
    let url = Url::parse(video_url).map_err(|e| SubtitleError::InvalidUrl(e.to_string()))?;

    let raw_id = query_param(&url, "bvid")
        .or_else(|| last_path_segment(&url))
        .ok_or(SubtitleError::IdentifierMissing)?;

    classify_identifier(&raw_id)
}

/// Classify an identifier by its case-insensitive `bv`/`av` prefix
pub fn classify_identifier(raw_id: &str) -> Result<MediaIdentifier, SubtitleError> {
    let prefix = raw_id.get(..2).map(|p| p.to_ascii_lowercase());

    match prefix.as_deref() {
        Some("bv") => Ok(MediaIdentifier {
            kind: MediaIdKind::Bv,
            raw_id: raw_id.to_string(),
            numeric_id: None,
        }),
        Some("av") => Ok(MediaIdentifier {
            kind: MediaIdKind::Av,
            raw_id: raw_id.to_string(),
            numeric_id: Some(raw_id[2..].to_string()),
        }),
        _ => Err(SubtitleError::UnrecognizedIdentifier),
    }
}

fn last_path_segment(url: &Url) -> Option<String> {
    let path = url.path();
    let path = path.strip_suffix('/').unwrap_or(path);
    path.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Force a secure scheme on a track URL
pub fn normalize_track_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        format!("https://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("https://{}", rest)
    } else {
        url.to_string()
    }
}

/// Pick the track to fetch: always the first, regardless of language
pub fn select_track(tracks: &[CaptionTrackDescriptor]) -> Option<&CaptionTrackDescriptor> {
    tracks.first()
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl ApiEnvelope {
    fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    fn message_or(&self, fallback: &str) -> String {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    #[serde(default)]
    cid: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    #[serde(default)]
    aid: Option<u64>,
    #[serde(default)]
    pages: Option<Vec<PageEntry>>,
}

#[derive(Debug, Deserialize)]
struct PlayerData {
    #[serde(default)]
    need_login_subtitle: Option<bool>,
    #[serde(default)]
    subtitle: Option<SubtitleContainer>,
}

#[derive(Debug, Deserialize)]
struct SubtitleContainer {
    #[serde(default)]
    subtitles: Option<Vec<TrackEntry>>,
}

#[derive(Debug, Deserialize)]
struct TrackEntry {
    #[serde(default)]
    subtitle_url: Option<String>,
    #[serde(default)]
    lan: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaptionPayload {
    #[serde(default)]
    body: Option<Vec<FromToCue>>,
}

fn decode_data<T: DeserializeOwned>(data: Value) -> Result<T, SubtitleError> {
    serde_json::from_value(data).map_err(|e| SubtitleError::Fetch(FetchError::from(e)))
}

/// Client for the Bilibili endpoint family
#[derive(Debug, Clone)]
pub struct BilibiliClient {
    http: Arc<dyn HttpClient>,
    api_base: String,
}

impl BilibiliClient {
    pub fn new(http: Arc<dyn HttpClient>, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Run the whole chain for `video_url`.
    ///
    /// Errors already carrying a user-facing prefix pass through; anything
    /// else is wrapped with the platform prefix.
    pub async fn fetch_subtitles(
        &self,
        video_url: &str,
        format: OutputFormat,
    ) -> Result<SubtitleDocument, SubtitleError> {
        match self.run_chain(video_url, format).await {
            Ok(document) => Ok(document),
            Err(e) => {
                error!("Bilibili subtitle retrieval failed: {}", e);
                if e.is_user_facing() {
                    Err(e)
                } else {
                    Err(SubtitleError::Platform(e.to_string()))
                }
            }
        }
    }

    async fn run_chain(&self, video_url: &str, format: OutputFormat) -> Result<SubtitleDocument, SubtitleError> {
        let identifier = extract_identity(video_url)?;
        let identity = self.resolve_identity(&identifier).await?;
        let tracks = self.discover_tracks(&identity).await?;
        let track = select_track(&tracks).ok_or(SubtitleError::NoValidCaptions)?;

        info!(
            "Fetching {} caption track for {}",
            track.language.as_deref().unwrap_or("unknown"),
            identity.raw_id
        );
        let cues = self.fetch_track(track).await?;

        Ok(SubtitleDocument::from_from_to(&cues, format))
    }

    /// Step 2: find `aid` and the first page's `cid`
    pub async fn resolve_identity(&self, identifier: &MediaIdentifier) -> Result<ResolvedMediaIdentity, SubtitleError> {
        let (aid, cid) = match identifier.kind {
            MediaIdKind::Bv => {
                let envelope: ApiEnvelope = VIDEO_INFO
                    .fetch_json(
                        self.http.as_ref(),
                        &[("base", self.api_base.as_str()), ("bvid", identifier.raw_id.as_str())],
                    )
                    .await?;

                let data = match envelope.data.clone() {
                    Some(data) if envelope.is_success() && !data.is_null() => data,
                    _ => return Err(SubtitleError::VideoInfo(envelope.message_or("未知错误"))),
                };
                let view: ViewData = decode_data(data)?;

                let first_page = view
                    .pages
                    .as_ref()
                    .and_then(|pages| pages.first())
                    .ok_or(SubtitleError::NoPages)?;

                (view.aid.map(|aid| aid.to_string()), first_page.cid)
            }
            MediaIdKind::Av => {
                let aid = identifier.numeric_id.clone().unwrap_or_default();
                let envelope: ApiEnvelope = PAGE_LIST
                    .fetch_json(self.http.as_ref(), &[("base", self.api_base.as_str()), ("aid", aid.as_str())])
                    .await?;

                let data = match envelope.data.clone() {
                    Some(data) if envelope.is_success() && !data.is_null() => data,
                    _ => return Err(SubtitleError::PageList(envelope.message_or("未知错误"))),
                };
                let pages: Vec<PageEntry> = decode_data(data)?;
                let first_page = pages
                    .first()
                    .ok_or_else(|| SubtitleError::PageList(envelope.message_or("未知错误")))?;

                (Some(aid), first_page.cid)
            }
        };

        match (aid.filter(|a| !a.is_empty() && a != "0"), cid.filter(|c| *c != 0)) {
            (Some(aid), Some(cid)) => {
                debug!("Resolved {} to aid={} cid={}", identifier.raw_id, aid, cid);
                Ok(ResolvedMediaIdentity {
                    kind: identifier.kind,
                    raw_id: identifier.raw_id.clone(),
                    numeric_id: aid,
                    track_id: cid.to_string(),
                })
            }
            _ => Err(SubtitleError::MissingIds),
        }
    }

    /// Step 3: list tracks that have a non-blank URL
    pub async fn discover_tracks(
        &self,
        identity: &ResolvedMediaIdentity,
    ) -> Result<Vec<CaptionTrackDescriptor>, SubtitleError> {
        let envelope: ApiEnvelope = CAPTION_LIST
            .fetch_json(
                self.http.as_ref(),
                &[
                    ("base", self.api_base.as_str()),
                    ("aid", identity.numeric_id.as_str()),
                    ("cid", identity.track_id.as_str()),
                ],
            )
            .await?;

        if !envelope.is_success() {
            return Err(SubtitleError::CaptionApi(envelope.message_or("接口返回错误")));
        }

        let player: PlayerData = match envelope.data {
            Some(data) if !data.is_null() => decode_data(data)?,
            _ => return Err(SubtitleError::CaptionDataMissing),
        };
        let container = player.subtitle.ok_or(SubtitleError::CaptionDataMissing)?;
        let entries = container.subtitles.unwrap_or_default();

        if player.need_login_subtitle.unwrap_or(false) && entries.is_empty() {
            return Err(SubtitleError::LoginRequired);
        }

        let tracks: Vec<CaptionTrackDescriptor> = entries
            .into_iter()
            .filter_map(|entry| {
                let url = entry.subtitle_url.filter(|u| !u.trim().is_empty())?;
                Some(CaptionTrackDescriptor { url, language: entry.lan })
            })
            .collect();

        if tracks.is_empty() {
            return Err(SubtitleError::NoValidCaptions);
        }

        debug!("Found {} caption track(s) for {}", tracks.len(), identity.raw_id);
        Ok(tracks)
    }

    /// Step 4: fetch a track payload over a secure scheme
    pub async fn fetch_track(&self, track: &CaptionTrackDescriptor) -> Result<Vec<FromToCue>, SubtitleError> {
        let url = normalize_track_url(&track.url);
        let payload: CaptionPayload = CAPTION_PAYLOAD
            .fetch_json(self.http.as_ref(), &[("url", url.as_str())])
            .await?;

        payload.body.ok_or(SubtitleError::InvalidPayload)
    }
}

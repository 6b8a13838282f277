/*!
 * Tests for the Bilibili caption chain
 */

use std::sync::Arc;
use serde_json::json;
use fisher_subs::errors::SubtitleError;
use fisher_subs::http::AuthMode;
use fisher_subs::platforms::bilibili::{
    extract_identity, normalize_track_url, select_track, BilibiliClient, CaptionTrackDescriptor, MediaIdKind,
};
use fisher_subs::subtitle_format::OutputFormat;
use crate::common;
use crate::common::mock_http::MockHttpClient;

const API_BASE: &str = "https://api.bilibili.test";
const TRACK_URL: &str = "//cdn.example/bfs/subtitle/track.json";

fn client_with(http: MockHttpClient) -> (BilibiliClient, Arc<MockHttpClient>) {
    let http = Arc::new(http);
    (BilibiliClient::new(http.clone(), API_BASE), http)
}

fn happy_path_http() -> MockHttpClient {
    MockHttpClient::new()
        .route("/x/web-interface/view", common::bilibili_view_json(42, 4242))
        .route("/x/player/wbi/v2", common::bilibili_player_json(&[TRACK_URL], false))
        .route("cdn.example", common::bilibili_caption_json())
}

#[test]
fn test_extractIdentity_withVideoPath_shouldReadBvId() {
    let identifier = extract_identity("https://www.bilibili.com/video/BV123/").unwrap();

    assert_eq!(identifier.kind, MediaIdKind::Bv);
    assert_eq!(identifier.raw_id, "BV123");
    assert_eq!(identifier.numeric_id, None);
}

#[test]
fn test_extractIdentity_withBvidParam_shouldPreferParam() {
    let identifier = extract_identity("https://www.bilibili.com/video/BV999?bvid=BV777&p=1").unwrap();

    assert_eq!(identifier.raw_id, "BV777");
}

#[test]
fn test_extractIdentity_withAvPath_shouldCarryNumericId() {
    let identifier = extract_identity("https://www.bilibili.com/video/av170001").unwrap();

    assert_eq!(identifier.kind, MediaIdKind::Av);
    assert_eq!(identifier.numeric_id.as_deref(), Some("170001"));
}

#[test]
fn test_extractIdentity_withOtherIdentifiers_shouldFail() {
    assert!(matches!(
        extract_identity("https://www.bilibili.com/bangumi/play/ep12345"),
        Err(SubtitleError::UnrecognizedIdentifier)
    ));
    assert!(matches!(
        extract_identity("https://www.bilibili.com/"),
        Err(SubtitleError::IdentifierMissing)
    ));
    assert!(matches!(extract_identity("not a url"), Err(SubtitleError::InvalidUrl(_))));
}

#[test]
fn test_normalizeTrackUrl_shouldForceHttps() {
    assert_eq!(normalize_track_url("//cdn/x.json"), "https://cdn/x.json");
    assert_eq!(normalize_track_url("http://cdn/x.json"), "https://cdn/x.json");
    assert_eq!(normalize_track_url("https://cdn/x.json"), "https://cdn/x.json");
}

#[test]
fn test_selectTrack_shouldTakeFirstRegardlessOfLanguage() {
    let tracks = vec![
        CaptionTrackDescriptor { url: "a".into(), language: Some("ai-zh".into()) },
        CaptionTrackDescriptor { url: "b".into(), language: Some("en-US".into()) },
    ];

    assert_eq!(select_track(&tracks).map(|t| t.url.as_str()), Some("a"));
    assert!(select_track(&[]).is_none());
}

#[tokio::test]
async fn test_fetchSubtitles_withBvVideo_shouldRunFullChain() {
    let (client, http) = client_with(happy_path_http());

    let document = client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
        .await
        .unwrap();

    assert_eq!(
        document.render(),
        "1\n00:00:00,000 --> 00:00:01,000\nhello\n\n2\n00:00:01,500 --> 00:00:03,500\nworld\n"
    );

    let calls = http.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].url, "https://api.bilibili.test/x/web-interface/view?bvid=BV123");
    assert_eq!(calls[1].url, "https://api.bilibili.test/x/player/wbi/v2?aid=42&cid=4242");
    assert_eq!(calls[2].url, "https://cdn.example/bfs/subtitle/track.json");
}

#[tokio::test]
async fn test_fetchSubtitles_shouldSendCookiesOnlyToMetadataEndpoints() {
    let (client, http) = client_with(happy_path_http());

    client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Text)
        .await
        .unwrap();

    let auth: Vec<AuthMode> = http.calls().into_iter().map(|call| call.auth).collect();
    assert_eq!(
        auth,
        vec![AuthMode::CookieCredentialed, AuthMode::CookieCredentialed, AuthMode::None]
    );
}

#[tokio::test]
async fn test_fetchSubtitles_withAvVideo_shouldUsePageList() {
    let http = MockHttpClient::new()
        .route("/x/player/pagelist", common::bilibili_pagelist_json(777))
        .route("/x/player/wbi/v2", common::bilibili_player_json(&["http://cdn.example/t.json"], false))
        .route("cdn.example", common::bilibili_caption_json());
    let (client, http) = client_with(http);

    let document = client
        .fetch_subtitles("https://www.bilibili.com/video/av170001", OutputFormat::Text)
        .await
        .unwrap();

    assert_eq!(document.render(), "hello\nworld");
    assert_eq!(
        http.call_matching("pagelist").unwrap().url,
        "https://api.bilibili.test/x/player/pagelist?aid=170001"
    );
    assert_eq!(
        http.call_matching("wbi/v2").unwrap().url,
        "https://api.bilibili.test/x/player/wbi/v2?aid=170001&cid=777"
    );
    assert_eq!(http.call_matching("cdn.example").unwrap().url, "https://cdn.example/t.json");
    assert!(http.call_matching("web-interface").is_none());
}

#[tokio::test]
async fn test_fetchSubtitles_withLoginRequired_shouldReportLogin() {
    let http = MockHttpClient::new()
        .route("/x/web-interface/view", common::bilibili_view_json(42, 4242))
        .route("/x/player/wbi/v2", common::bilibili_player_json(&[], true));
    let (client, http) = client_with(http);

    let error = client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
        .await
        .unwrap_err();

    assert!(matches!(error, SubtitleError::LoginRequired));
    assert_eq!(error.to_string(), "视频字幕获取失败，原因：需要登录才能获取字幕！");
    assert_eq!(http.call_count(), 2);
}

#[tokio::test]
async fn test_fetchSubtitles_withBlankTrackUrls_shouldReportNoValidCaptions() {
    let http = MockHttpClient::new()
        .route("/x/web-interface/view", common::bilibili_view_json(42, 4242))
        .route("/x/player/wbi/v2", common::bilibili_player_json(&["", "   "], true));
    let (client, _http) = client_with(http);

    let error = client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
        .await
        .unwrap_err();

    assert!(matches!(error, SubtitleError::NoValidCaptions));
    assert_eq!(error.to_string(), "视频字幕获取失败，原因：该视频暂未提供有效字幕！");
}

#[tokio::test]
async fn test_fetchSubtitles_withCaptionApiError_shouldPassMessageThrough() {
    let http = MockHttpClient::new()
        .route("/x/web-interface/view", common::bilibili_view_json(42, 4242))
        .route("/x/player/wbi/v2", json!({ "code": -400, "message": "请求错误" }).to_string());
    let (client, _http) = client_with(http);

    let error = client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
        .await
        .unwrap_err();

    assert_eq!(error.to_string(), "视频字幕获取失败，原因： 请求错误");
}

#[tokio::test]
async fn test_fetchSubtitles_withVideoInfoError_shouldWrapWithPlatformPrefix() {
    let http = MockHttpClient::new()
        .route("/x/web-interface/view", json!({ "code": -404, "message": "啥都木有" }).to_string());
    let (client, _http) = client_with(http);

    let error = client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
        .await
        .unwrap_err();

    assert!(matches!(error, SubtitleError::Platform(_)));
    assert_eq!(error.to_string(), "处理B站字幕时出错: 获取视频信息失败: 啥都木有");
}

#[tokio::test]
async fn test_fetchSubtitles_withTransportFailure_shouldWrapWithPlatformPrefix() {
    let http = MockHttpClient::new().route_status("/x/web-interface/view", 503, "unavailable");
    let (client, _http) = client_with(http);

    let error = client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
        .await
        .unwrap_err();

    let message = error.to_string();
    assert!(message.starts_with("处理B站字幕时出错: "));
    assert!(message.contains("503"));
}

#[tokio::test]
async fn test_fetchSubtitles_withUnrecognizedId_shouldPassThroughWithoutCalls() {
    let (client, http) = client_with(MockHttpClient::new());

    let error = client
        .fetch_subtitles("https://www.bilibili.com/bangumi/play/ep12345", OutputFormat::Srt)
        .await
        .unwrap_err();

    assert_eq!(error.to_string(), "无法识别的视频ID格式 (非BV或AV号)");
    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn test_fetchSubtitles_withMissingCid_shouldReportMissingIds() {
    let http = MockHttpClient::new().route(
        "/x/web-interface/view",
        json!({ "code": 0, "data": { "aid": 42, "pages": [{ "page": 1 }] } }).to_string(),
    );
    let (client, _http) = client_with(http);

    let error = client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
        .await
        .unwrap_err();

    assert!(matches!(error, SubtitleError::MissingIds));
}

#[tokio::test]
async fn test_fetchSubtitles_withoutPages_shouldReportNoPages() {
    let http = MockHttpClient::new().route(
        "/x/web-interface/view",
        json!({ "code": 0, "data": { "aid": 42, "pages": [] } }).to_string(),
    );
    let (client, _http) = client_with(http);

    let error = client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
        .await
        .unwrap_err();

    assert_eq!(error.to_string(), "无法获取视频的分P信息");
}

#[tokio::test]
async fn test_fetchSubtitles_withPayloadWithoutBody_shouldWrapInvalidPayload() {
    let http = MockHttpClient::new()
        .route("/x/web-interface/view", common::bilibili_view_json(42, 4242))
        .route("/x/player/wbi/v2", common::bilibili_player_json(&[TRACK_URL], false))
        .route("cdn.example", json!({ "font_size": 0.4 }).to_string());
    let (client, _http) = client_with(http);

    let error = client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
        .await
        .unwrap_err();

    assert_eq!(error.to_string(), "处理B站字幕时出错: 获取字幕内容失败，格式无效");
}

#[tokio::test]
async fn test_fetchSubtitles_withEmptyBody_shouldReturnEmptyDocument() {
    let http = MockHttpClient::new()
        .route("/x/web-interface/view", common::bilibili_view_json(42, 4242))
        .route("/x/player/wbi/v2", common::bilibili_player_json(&[TRACK_URL], false))
        .route("cdn.example", json!({ "body": [] }).to_string());
    let (client, _http) = client_with(http);

    let document = client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
        .await
        .unwrap();

    assert!(document.is_empty());
    assert_eq!(document.render(), "");
}

#[tokio::test]
async fn test_fetchSubtitles_withEmptyTracksAndNoLoginFlag_shouldReportNoValidCaptions() {
    let http = MockHttpClient::new()
        .route("/x/web-interface/view", common::bilibili_view_json(42, 4242))
        .route("/x/player/wbi/v2", common::bilibili_player_json(&[], false));
    let (client, http) = client_with(http);

    let error = client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
        .await
        .unwrap_err();

    assert!(matches!(error, SubtitleError::NoValidCaptions));
    assert_eq!(error.to_string(), "视频字幕获取失败，原因：该视频暂未提供有效字幕！");
    assert_eq!(http.call_count(), 2);
}

#[tokio::test]
async fn test_fetchSubtitles_withNullLoginFlag_shouldTreatAsFalse() {
    let http = MockHttpClient::new()
        .route("/x/web-interface/view", common::bilibili_view_json(42, 4242))
        .route(
            "/x/player/wbi/v2",
            json!({ "code": 0, "data": { "need_login_subtitle": null, "subtitle": { "subtitles": [] } } }).to_string(),
        );
    let (client, _http) = client_with(http);

    let error = client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
        .await
        .unwrap_err();

    assert!(matches!(error, SubtitleError::NoValidCaptions));
}

#[tokio::test]
async fn test_fetchSubtitles_withoutCaptionData_shouldReportDataMissing() {
    let responses = [
        json!({ "code": 0, "message": "0" }),
        json!({ "code": 0, "data": null }),
        json!({ "code": 0, "data": { "need_login_subtitle": false } }),
    ];

    for response in responses {
        let http = MockHttpClient::new()
            .route("/x/web-interface/view", common::bilibili_view_json(42, 4242))
            .route("/x/player/wbi/v2", response.to_string());
        let (client, _http) = client_with(http);

        let error = client
            .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
            .await
            .unwrap_err();

        assert!(matches!(error, SubtitleError::CaptionDataMissing), "response {}", response);
        assert_eq!(error.to_string(), "视频字幕获取失败，原因：接口未返回字幕数据");
    }
}

#[tokio::test]
async fn test_fetchSubtitles_withEnvelopeOnErrorStatus_shouldPassMessageThrough() {
    let http = MockHttpClient::new()
        .route("/x/web-interface/view", common::bilibili_view_json(42, 4242))
        .route_status(
            "/x/player/wbi/v2",
            403,
            json!({ "code": -403, "message": "访问权限不足" }).to_string(),
        );
    let (client, _http) = client_with(http);

    let error = client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
        .await
        .unwrap_err();

    assert_eq!(error.to_string(), "视频字幕获取失败，原因： 访问权限不足");
}

#[tokio::test]
async fn test_fetchSubtitles_withPageListError_shouldWrapWithPlatformPrefix() {
    let http = MockHttpClient::new()
        .route("/x/player/pagelist", json!({ "code": -404, "message": "啥都木有" }).to_string());
    let (client, http) = client_with(http);

    let error = client
        .fetch_subtitles("https://www.bilibili.com/video/av170001", OutputFormat::Srt)
        .await
        .unwrap_err();

    assert_eq!(error.to_string(), "处理B站字幕时出错: 获取视频分P列表失败: 啥都木有");
    assert_eq!(http.call_count(), 1);
}

#[tokio::test]
async fn test_fetchSubtitles_withEmptyPageList_shouldWrapWithPlatformPrefix() {
    let http = MockHttpClient::new()
        .route("/x/player/pagelist", json!({ "code": 0, "message": "0", "data": [] }).to_string());
    let (client, _http) = client_with(http);

    let error = client
        .fetch_subtitles("https://www.bilibili.com/video/av170001", OutputFormat::Srt)
        .await
        .unwrap_err();

    assert_eq!(error.to_string(), "处理B站字幕时出错: 获取视频分P列表失败: 0");
}

#[tokio::test]
async fn test_fetchSubtitles_withZeroAvIds_shouldReportMissingIds() {
    let cases = [
        ("https://www.bilibili.com/video/av170001", common::bilibili_pagelist_json(0)),
        ("https://www.bilibili.com/video/av0", common::bilibili_pagelist_json(777)),
        ("https://www.bilibili.com/video/av", common::bilibili_pagelist_json(777)),
    ];

    for (video_url, pagelist) in cases {
        let http = MockHttpClient::new().route("/x/player/pagelist", pagelist);
        let (client, http) = client_with(http);

        let error = client.fetch_subtitles(video_url, OutputFormat::Srt).await.unwrap_err();

        assert!(matches!(error, SubtitleError::MissingIds), "url {}", video_url);
        assert_eq!(error.to_string(), "未能成功获取视频的 AID 和 CID");
        assert!(http.call_matching("wbi/v2").is_none());
    }
}

#[tokio::test]
async fn test_fetchSubtitles_shouldIssueGetRequests() {
    let (client, http) = client_with(happy_path_http());

    client
        .fetch_subtitles("https://www.bilibili.com/video/BV123", OutputFormat::Srt)
        .await
        .unwrap();

    assert!(http.calls().iter().all(|call| call.method == "GET"));
}

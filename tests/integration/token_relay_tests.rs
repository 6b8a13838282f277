/*!
 * Token flow from page interception through the relay to caption retrieval
 */

use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use fisher_subs::bridge::relay_channel;
use fisher_subs::http::ReqwestHttpClient;
use fisher_subs::interceptor::{PageContext, TokenLookup};
use fisher_subs::platforms::bilibili::BilibiliClient;
use fisher_subs::platforms::{SubtitleOrchestrator, YoutubeTranscriptClient};
use fisher_subs::subtitle_format::OutputFormat;
use crate::common;
use crate::common::mock_http::{MockHttpClient, RecordingFetch, RecordingXhr};

const VIDEO_ID: &str = "bbbbbbbbbbb";

#[tokio::test]
async fn test_pageCapture_shouldReachExtensionAndAuthorizeCaptionFetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .and(query_param("v", VIDEO_ID))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::youtube_watch_page(&server.uri(), VIDEO_ID)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/timedtext"))
        .and(query_param("pot", "PAGE_TOKEN"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::youtube_transcript_xml()))
        .expect(1)
        .mount(&server)
        .await;

    // Page side
    let xhr = Arc::new(RecordingXhr::new());
    let mut page = PageContext::new(
        &format!("https://www.youtube.com/watch?v={}", VIDEO_ID),
        Arc::new(RecordingFetch::new()),
        xhr.clone(),
    );
    let (relay, receiver) = relay_channel();
    let registry = receiver.registry();
    let relay_task = receiver.spawn();
    page.install(Arc::new(relay));

    page.xhr_open("GET", "https://www.youtube.com/api/timedtext?lang=en&pot=PAGE_TOKEN");
    page.xhr_open("GET", "https://www.youtube.com/youtubei/v1/log_event");
    assert_eq!(xhr.opened().len(), 2);

    drop(page);
    assert_eq!(relay_task.await.unwrap(), 1);
    assert_eq!(registry.get_token(VIDEO_ID).as_deref(), Some("PAGE_TOKEN"));

    // Extension side
    let transcripts = YoutubeTranscriptClient::new(Arc::new(ReqwestHttpClient::new(None, None)), server.uri())
        .with_tokens(Arc::new(registry));
    let orchestrator = SubtitleOrchestrator::new(
        Arc::new(transcripts),
        BilibiliClient::new(Arc::new(MockHttpClient::new()), "https://api.bilibili.test"),
    )
    .with_preferred_language(Some("en".to_string()));

    let text = orchestrator
        .extract_subtitles(&format!("https://www.youtube.com/watch?v={}", VIDEO_ID), OutputFormat::Text)
        .await
        .unwrap();

    assert_eq!(text.as_deref(), Some("hi\nit's me"));
}

#[tokio::test]
async fn test_navigation_shouldKeepRelayingTokensForEachVideo() {
    let mut page = PageContext::new(
        "https://www.youtube.com/watch?v=first000001",
        Arc::new(RecordingFetch::new()),
        Arc::new(RecordingXhr::new()),
    );
    let (relay, receiver) = relay_channel();
    let registry = receiver.registry();
    let relay_task = receiver.spawn();
    page.install(Arc::new(relay));

    page.xhr_open("GET", "/api/timedtext?pot=T1");
    page.location().navigate("https://www.youtube.com/watch?v=second00002");
    page.xhr_open("GET", "/api/timedtext?pot=T2");

    assert_eq!(page.get_pot_parameter("first000001").as_deref(), Some("T1"));
    assert_eq!(page.get_pot_parameter("second00002").as_deref(), Some("T2"));

    drop(page);
    assert_eq!(relay_task.await.unwrap(), 2);
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get_token("first000001").as_deref(), Some("T1"));
}

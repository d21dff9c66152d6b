//! End-to-end runs of the manifest pipeline against a local HTTP server.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use reqwest::Client;
use vimeo_engine::{NoopProgress, VideoReference, VimeoConfig, VimeoDownloader};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// ffmpeg stand-in: concatenates the two `-i` inputs into the file it is
/// told to write.
fn fake_ffmpeg(dir: &Path) -> PathBuf {
    let script = dir.join("fake-ffmpeg");
    std::fs::write(
        &script,
        "#!/bin/sh\nfor last; do :; done\ncat \"$6\" \"$8\" > \"$last\"\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

fn player_page(server: &MockServer) -> String {
    format!(
        r#"<script>window.playerConfig = {{"request":{{"files":{{"dash":{{"cdns":{{"akfire_interconnect_quic":{{"url":"{}/sep/video/master.json?base64_init=1","origin":"gcs"}}}},"streams":[{{"id":"v360-a","quality":"360p"}},{{"id":"v720-b","quality":"720p"}}]}}}}}}}};</script>"#,
        server.uri()
    )
}

fn master_json() -> serde_json::Value {
    // base64("VI") and base64("AI")
    serde_json::json!({
        "clip_id": "clip42",
        "base_url": "../",
        "video": [
            {"id": "v720", "base_url": "v720/", "height": 720, "init_segment": "Vkk=",
             "segments": [{"url": "s1.m4s", "size": 2}]},
            {"id": "v360", "base_url": "v360/", "height": 360, "init_segment": "Vkk=",
             "segments": [{"url": "s1.m4s", "size": 2}, {"url": "s2.m4s", "size": 2}]},
            {"id": "v1080", "base_url": "v1080/", "height": 1080, "init_segment": "Vkk=",
             "segments": [{"url": "s1.m4s", "size": 3}]}
        ],
        "audio": [
            {"id": "a64", "base_url": "a64/", "bitrate": 64000, "init_segment": "QUk=",
             "segments": [{"url": "s1.m4s", "size": 2}]},
            {"id": "a128", "base_url": "a128/", "bitrate": 128000, "init_segment": "QUk=",
             "segments": [{"url": "s1.m4s", "size": 2}]}
        ]
    })
}

async fn mount_pipeline(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/video/42"))
        .and(header("referer", "https://laracasts.com/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(player_page(server)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sep/video/master.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(master_json()))
        .mount(server)
        .await;

    for (segment, body) in [
        ("/sep/v720/s1.m4s", "7a"),
        ("/sep/v360/s1.m4s", "3a"),
        ("/sep/v360/s2.m4s", "3b"),
        ("/sep/v1080/s1.m4s", "10a"),
        ("/sep/a64/s1.m4s", "lo"),
        ("/sep/a128/s1.m4s", "hi"),
    ] {
        Mock::given(method("GET"))
            .and(path(segment))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }
}

fn downloader(server: &MockServer, ffmpeg: PathBuf, quality: Option<&str>) -> VimeoDownloader {
    let config = VimeoConfig {
        player_base_url: server.uri(),
        ffmpeg_path: ffmpeg,
        quality: quality.map(str::to_string),
        ..VimeoConfig::default()
    };
    VimeoDownloader::new(Client::new(), config)
}

#[tokio::test]
async fn downloads_tallest_video_and_best_audio() {
    let server = MockServer::start().await;
    mount_pipeline(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("Season 01").join("episode.mp4");

    let ok = downloader(&server, fake_ffmpeg(dir.path()), None)
        .download(&VideoReference::new(42), &output, &NoopProgress)
        .await
        .unwrap();

    assert!(ok);
    assert_eq!(std::fs::read(&output).unwrap(), b"VI10aAIhi");
    assert!(!dir.path().join("Season 01/clip42.m4v").exists());
    assert!(!dir.path().join("Season 01/clip42.m4a").exists());
    assert!(!dir.path().join("Season 01/clip42.m4v.cursor").exists());
    assert!(!dir.path().join("Season 01/episode.part.mp4").exists());
}

#[tokio::test]
async fn quality_label_selects_matching_variant() {
    let server = MockServer::start().await;
    mount_pipeline(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("episode.mp4");

    let ok = downloader(&server, fake_ffmpeg(dir.path()), Some("1080p"))
        .download(
            &VideoReference::new(42).with_quality("360p"),
            &output,
            &NoopProgress,
        )
        .await
        .unwrap();

    assert!(ok);
    assert_eq!(std::fs::read(&output).unwrap(), b"VI3a3bAIhi");
}

#[tokio::test]
async fn existing_output_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("episode.mp4");
    std::fs::write(&output, b"done").unwrap();

    let downloader = downloader(&server, fake_ffmpeg(dir.path()), None);
    for _ in 0..2 {
        let ok = downloader
            .download(&VideoReference::new(42), &output, &NoopProgress)
            .await
            .unwrap();
        assert!(ok);
    }
    assert_eq!(std::fs::read(&output).unwrap(), b"done");
}

#[tokio::test]
async fn broken_player_page_is_an_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>private video</html>"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let err = downloader(&server, fake_ffmpeg(dir.path()), None)
        .download(
            &VideoReference::new(42),
            &dir.path().join("episode.mp4"),
            &NoopProgress,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, vimeo_engine::VimeoError::UpstreamParse { .. }));
    assert!(!dir.path().join("episode.mp4").exists());
}

#[tokio::test]
async fn interrupted_track_of_another_variant_is_not_resumed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sep/v360/s2.m4s"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_pipeline(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("episode.mp4");
    let ffmpeg = fake_ffmpeg(dir.path());

    // The first run stops inside the 360p track, the second one wants 1080p.
    let err = downloader(&server, ffmpeg.clone(), Some("360p"))
        .download(&VideoReference::new(42), &output, &NoopProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, vimeo_engine::VimeoError::HttpStatus { .. }));
    assert!(!output.exists());

    let ok = downloader(&server, ffmpeg, None)
        .download(&VideoReference::new(42), &output, &NoopProgress)
        .await
        .unwrap();

    assert!(ok);
    assert_eq!(std::fs::read(&output).unwrap(), b"VI10aAIhi");
}

#[tokio::test]
async fn finished_video_track_survives_audio_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sep/a128/s1.m4s"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sep/v1080/s1.m4s"))
        .respond_with(ResponseTemplate::new(200).set_body_string("10a"))
        .expect(1)
        .mount(&server)
        .await;
    mount_pipeline(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("episode.mp4");
    let downloader = downloader(&server, fake_ffmpeg(dir.path()), None);

    let err = downloader
        .download(&VideoReference::new(42), &output, &NoopProgress)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(dir.path().join("clip42.m4v.cursor").exists());

    let ok = downloader
        .download(&VideoReference::new(42), &output, &NoopProgress)
        .await
        .unwrap();

    assert!(ok);
    assert_eq!(std::fs::read(&output).unwrap(), b"VI10aAIhi");
    for leftover in ["clip42.m4v", "clip42.m4a", "clip42.m4v.cursor", "clip42.m4a.cursor"] {
        assert!(!dir.path().join(leftover).exists(), "{leftover} left behind");
    }
}

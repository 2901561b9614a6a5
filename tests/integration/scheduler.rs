// End-to-end scheduler behaviour against the in-process engine

use crate::common::fake_engine::{
    AUDIO_ONLY_LISTING, ENCODER_ERROR, FakeEngine, NVENC_ONLY_LISTING, outputs_in,
};
use crate::common::helpers::{arg_after, fake_video};
use ffclip::engine::{
    FailureKind, FatalError, PresetTable, TranscodeError, TranscodeRequest, Transcoder,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn transcoder(engine: &Arc<FakeEngine>) -> Transcoder {
    Transcoder::new(engine.clone())
}

#[test]
fn test_three_resolutions_all_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let out = dir.path().join("out");
    let engine = Arc::new(FakeEngine::new());

    let report = transcoder(&engine)
        .run(TranscodeRequest::new(&input, [360, 720, 1080], &out))
        .unwrap();

    assert!(!report.is_fatal());
    assert_eq!(report.produced.len(), 3);
    assert!(report.failures.is_empty());
    assert_eq!(report.encoder.as_deref(), Some("libx264"));
    assert_eq!(report.input, input);

    let mut produced: Vec<PathBuf> = report.produced.iter().map(|r| r.output_path.clone()).collect();
    produced.sort();
    assert_eq!(
        produced,
        vec![
            out.join("clip_1080p.mp4"),
            out.join("clip_360p.mp4"),
            out.join("clip_720p.mp4"),
        ]
    );
    assert_eq!(outputs_in(&out), produced);

    // One probe for the whole request, one run per resolution
    assert_eq!(engine.list_calls(), 1);
    assert_eq!(engine.run_count(), 3);
}

#[test]
fn test_failed_resolution_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let out = dir.path().join("out");
    let engine = Arc::new(FakeEngine::new().failing_on(720));

    let report = transcoder(&engine)
        .run(TranscodeRequest::new(&input, [360, 720, 1080], &out))
        .unwrap();

    assert_eq!(report.produced.len(), 2);
    assert_eq!(report.failures.len(), 1);

    let failed = &report.failures[0];
    assert_eq!(failed.resolution, 720);
    assert!(!failed.success);
    let failure = failed.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::NonZeroExit);
    assert_eq!(failure.exit_code, Some(1));
    assert!(failed.diagnostics().unwrap().contains(ENCODER_ERROR));

    assert!(!out.join("clip_720p.mp4").exists());
    assert!(out.join("clip_360p.mp4").exists());
    assert!(out.join("clip_1080p.mp4").exists());
    // The failed run's partial file is gone too
    assert_eq!(outputs_in(&out).len(), 2);
}

#[test]
fn test_no_encoder_is_fatal_before_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let out = dir.path().join("out");
    let engine = Arc::new(FakeEngine::new().with_listing(AUDIO_ONLY_LISTING));

    let report = transcoder(&engine)
        .run(TranscodeRequest::new(&input, [360, 720], &out))
        .unwrap();

    assert_eq!(report.fatal, Some(FatalError::EncoderUnavailable));
    assert!(report.is_empty());
    assert_eq!(report.encoder, None);
    assert_eq!(engine.run_count(), 0);
    assert_eq!(engine.list_calls(), 1);
}

#[test]
fn test_failed_listing_counts_as_no_encoder() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let engine = Arc::new(FakeEngine::new().listing_fails());

    let report = transcoder(&engine)
        .run(TranscodeRequest::new(&input, [480], dir.path()))
        .unwrap();

    assert!(report.is_fatal());
    assert_eq!(engine.run_count(), 0);
}

#[test]
fn test_unknown_resolution_uses_fallback_plan() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let engine = Arc::new(FakeEngine::new());

    let report = transcoder(&engine)
        .run(TranscodeRequest::new(&input, [360, 99999], dir.path()))
        .unwrap();
    assert_eq!(report.produced.len(), 2);

    let odd = engine.run_for_height(99998).expect("99999 scaled to an even height");
    assert_eq!(arg_after(&odd, "-b:v"), Some("1500k"));
    assert_eq!(arg_after(&odd, "-preset"), Some("medium"));
    // ffmpeg writes to a per-job staging name that keeps the container
    let dest = odd.last().unwrap();
    assert!(dest.contains("clip_99999p."));
    assert!(dest.ends_with(".part.mp4"));
    assert!(
        report
            .produced
            .iter()
            .any(|r| r.output_path == dir.path().join("clip_99999p.mp4"))
    );

    let small = engine.run_for_height(360).unwrap();
    assert_eq!(arg_after(&small, "-b:v"), Some("800k"));
    assert_eq!(arg_after(&small, "-preset"), Some("veryfast"));
}

#[test]
fn test_rerun_overwrites_same_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let out = dir.path().join("out");
    let engine = Arc::new(FakeEngine::new());
    let transcoder = transcoder(&engine);

    let first = transcoder
        .run(TranscodeRequest::new(&input, [360, 720], &out))
        .unwrap();
    let second = transcoder
        .run(TranscodeRequest::new(&input, [360, 720], &out))
        .unwrap();

    let paths = |r: &ffclip::engine::TranscodeReport| {
        let mut p: Vec<PathBuf> = r.produced.iter().map(|x| x.output_path.clone()).collect();
        p.sort();
        p
    };
    assert_eq!(paths(&first), paths(&second));
    assert_eq!(outputs_in(&out).len(), 2);
    assert!(engine.runs().iter().all(|args| args.iter().any(|a| a == "-y")));
}

#[test]
fn test_duplicate_resolutions_each_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let engine = Arc::new(FakeEngine::new());

    let report = transcoder(&engine)
        .run(TranscodeRequest::new(&input, [720, 720], dir.path()))
        .unwrap();

    assert_eq!(report.len(), 2);
    assert_eq!(report.produced.len(), 2);
    assert_eq!(
        report.produced[0].output_path,
        report.produced[1].output_path
    );
    assert_ne!(report.produced[0].job_id, report.produced[1].job_id);
    assert_eq!(engine.run_count(), 2);
}

#[test]
fn test_timed_out_duplicate_keeps_sibling_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let out = dir.path().join("out");
    let engine = Arc::new(FakeEngine::new().with_delay(Duration::from_millis(150)));

    // The first 720p finishes, the second one runs into the deadline
    let report = transcoder(&engine)
        .run(
            TranscodeRequest::new(&input, [720, 720], &out)
                .with_max_workers(Some(1))
                .with_timeout(Some(Duration::from_millis(250))),
        )
        .unwrap();

    assert_eq!(report.produced.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        report.failures[0].failure.as_ref().unwrap().kind,
        FailureKind::TimedOut
    );

    let produced = &report.produced[0].output_path;
    assert_eq!(produced, &out.join("clip_720p.mp4"));
    assert!(produced.is_file(), "successful result must point at a real file");
    assert_eq!(outputs_in(&out), vec![produced.clone()]);
}

#[test]
fn test_failed_duplicate_keeps_sibling_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let out = dir.path().join("out");
    let engine = Arc::new(FakeEngine::new().failing_on(720));

    // A good 720p from an earlier run is already in place
    let first = transcoder(&Arc::new(FakeEngine::new()))
        .run(TranscodeRequest::new(&input, [720], &out))
        .unwrap();
    assert_eq!(first.produced.len(), 1);

    let report = transcoder(&engine)
        .run(TranscodeRequest::new(&input, [720, 720], &out).with_max_workers(Some(2)))
        .unwrap();
    assert_eq!(report.failures.len(), 2);

    // Earlier output untouched, no staging files left behind
    assert_eq!(outputs_in(&out), vec![out.join("clip_720p.mp4")]);
    assert!(std::fs::read_to_string(out.join("clip_720p.mp4")).unwrap().starts_with("fake output"));
}

#[test]
fn test_max_workers_bounds_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let engine = Arc::new(FakeEngine::new().with_delay(Duration::from_millis(40)));

    let report = transcoder(&engine)
        .run(
            TranscodeRequest::new(&input, [240, 360, 480, 720, 1080, 1440], dir.path())
                .with_max_workers(Some(2)),
        )
        .unwrap();

    assert_eq!(report.produced.len(), 6);
    assert!(engine.peak_concurrency() >= 1);
    assert!(
        engine.peak_concurrency() <= 2,
        "peak {} exceeded max_workers",
        engine.peak_concurrency()
    );
}

#[test]
fn test_single_worker_runs_serially() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let engine = Arc::new(FakeEngine::new().with_delay(Duration::from_millis(10)));

    let report = transcoder(&engine)
        .run(TranscodeRequest::new(&input, [360, 480, 720], dir.path()).with_max_workers(Some(1)))
        .unwrap();

    assert_eq!(report.produced.len(), 3);
    assert_eq!(engine.peak_concurrency(), 1);
}

#[test]
fn test_timeout_fails_unfinished_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let engine = Arc::new(FakeEngine::new().with_delay(Duration::from_secs(5)));

    let started = Instant::now();
    let report = transcoder(&engine)
        .run(
            TranscodeRequest::new(&input, [360, 720, 1080], dir.path())
                .with_max_workers(Some(1))
                .with_timeout(Some(Duration::from_millis(100))),
        )
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(report.len(), 3);
    assert!(report.produced.is_empty());
    for failed in &report.failures {
        assert_eq!(failed.failure.as_ref().unwrap().kind, FailureKind::TimedOut);
    }
    // The first job ran into the deadline; the rest never started
    assert_eq!(engine.run_count(), 1);
}

#[test]
fn test_every_job_uses_the_probed_encoder() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let engine = Arc::new(FakeEngine::new().with_listing(NVENC_ONLY_LISTING));

    let report = transcoder(&engine)
        .run(TranscodeRequest::new(&input, [360, 720, 1080], dir.path()))
        .unwrap();

    assert_eq!(report.encoder.as_deref(), Some("h264_nvenc"));
    let runs = engine.runs();
    let encoders: HashSet<&str> = runs.iter().filter_map(|a| arg_after(a, "-c:v")).collect();
    assert_eq!(encoders, HashSet::from(["h264_nvenc"]));
    // NVENC has its own preset names; none is passed
    assert!(runs.iter().all(|a| !a.iter().any(|x| x == "-preset")));
}

#[test]
fn test_preferred_encoder_wins_when_available() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let engine = Arc::new(FakeEngine::new());

    let report = transcoder(&engine)
        .with_preferred_encoder(Some("mpeg4".to_string()))
        .run(TranscodeRequest::new(&input, [480], dir.path()))
        .unwrap();
    assert_eq!(report.encoder.as_deref(), Some("mpeg4"));

    // Not offered by this ffmpeg: ranked order applies
    let report = transcoder(&engine)
        .with_preferred_encoder(Some("h264_amf".to_string()))
        .run(TranscodeRequest::new(&input, [480], dir.path()))
        .unwrap();
    assert_eq!(report.encoder.as_deref(), Some("libx264"));
}

#[test]
fn test_custom_presets_reach_the_command_line() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let engine = Arc::new(FakeEngine::new());
    let presets = PresetTable::with_overrides(&[ffclip::engine::PresetOverride {
        height: 720,
        bitrate: "3M".to_string(),
        preset: Some("medium".to_string()),
    }])
    .unwrap();

    transcoder(&engine)
        .with_presets(presets)
        .run(TranscodeRequest::new(&input, [720], dir.path()))
        .unwrap();

    let run = engine.run_for_height(720).unwrap();
    assert_eq!(arg_after(&run, "-b:v"), Some("3M"));
    assert_eq!(arg_after(&run, "-preset"), Some("medium"));
}

#[test]
fn test_output_dir_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let out = dir.path().join("a").join("b");
    let engine = Arc::new(FakeEngine::new());

    let report = transcoder(&engine)
        .run(TranscodeRequest::new(&input, [360], &out))
        .unwrap();
    assert!(out.is_dir());
    assert!(report.produced[0].output_path.starts_with(&out));
}

#[test]
fn test_uncreatable_output_dir_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    // A regular file where the directory should go
    let blocker = fake_video(dir.path(), "blocker");
    let engine = Arc::new(FakeEngine::new());

    let err = transcoder(&engine)
        .run(TranscodeRequest::new(&input, [360], blocker.join("out")))
        .unwrap_err();
    assert!(matches!(err, TranscodeError::OutputDir { .. }));
    assert_eq!(engine.run_count(), 0);
}

#[test]
fn test_hung_listing_is_bounded_by_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let input = fake_video(dir.path(), "clip.mp4");
    let out = dir.path().join("out");
    let engine = Arc::new(FakeEngine::new().with_listing_delay(Duration::from_secs(5)));

    let started = Instant::now();
    let report = transcoder(&engine)
        .run(
            TranscodeRequest::new(&input, [360, 720], &out)
                .with_timeout(Some(Duration::from_millis(100))),
        )
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.fatal, Some(FatalError::EncoderUnavailable));
    assert_eq!(engine.list_calls(), 1);
    assert_eq!(engine.run_count(), 0);
    assert!(!out.exists());
}

#[test]
fn test_transcode_entry_point_rejects_missing_input() {
    let dir = tempfile::tempdir().unwrap();

    // Validation comes first, so no ffmpeg is needed to get here
    let err = ffclip::engine::transcode(dir.path().join("gone.mp4"), [360], dir.path(), None)
        .unwrap_err();
    assert!(matches!(err, TranscodeError::InputNotFound(ref p) if p.ends_with("gone.mp4")));

    let err = ffclip::engine::transcode(dir.path().join("gone.mp4"), [360], dir.path(), Some(0))
        .unwrap_err();
    assert!(matches!(err, TranscodeError::InvalidRequest(_)));
}

#[test]
fn test_missing_input_never_probes() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new());

    let err = transcoder(&engine)
        .run(TranscodeRequest::new(dir.path().join("gone.mp4"), [360], dir.path()))
        .unwrap_err();
    assert!(matches!(err, TranscodeError::InputNotFound(_)));
    assert_eq!(engine.list_calls(), 0);
}

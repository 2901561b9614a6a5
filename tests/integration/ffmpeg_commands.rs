// Exact ffmpeg argument lists for each encoder and tool

use crate::common::helpers::args_to_string;
use ffclip::engine::tools::{
    AudioFormat, OverlayOptions, OverlayPosition, build_extract_audio_args, build_merge_args,
    build_overlay_args, build_thumbnail_args, overlay_output_path,
};
use ffclip::engine::{PresetTable, TranscodeJob, VideoEncoder, build_transcode_args};
use insta::assert_snapshot;
use std::path::Path;

fn transcode_cmd(resolution: u32, encoder: VideoEncoder) -> String {
    let job = TranscodeJob::new(Path::new("/tmp/input.mp4"), resolution, Path::new("/tmp/out"));
    let presets = PresetTable::builtin();
    let (bitrate, preset) = presets.plan_for(resolution);
    args_to_string(&build_transcode_args(&job, encoder, bitrate, preset))
}

#[test]
fn snapshot_x264_720() {
    assert_snapshot!(
        transcode_cmd(720, VideoEncoder::Libx264),
        @"-hide_banner -nostdin -y -i /tmp/input.mp4 -map 0:v:0 -map 0:a:0? -vf scale=-2:720 -c:v libx264 -b:v 2500k -preset slow -c:a copy -movflags +faststart /tmp/out/input_720p.mp4"
    );
}

#[test]
fn snapshot_qsv_480() {
    assert_snapshot!(
        transcode_cmd(480, VideoEncoder::H264Qsv),
        @"-hide_banner -nostdin -y -i /tmp/input.mp4 -map 0:v:0 -map 0:a:0? -vf scale=-2:480 -c:v h264_qsv -b:v 1200k -preset fast -c:a copy -movflags +faststart /tmp/out/input_480p.mp4"
    );
}

#[test]
fn snapshot_vaapi_1080() {
    assert_snapshot!(
        transcode_cmd(1080, VideoEncoder::H264Vaapi),
        @"-hide_banner -nostdin -y -vaapi_device /dev/dri/renderD128 -i /tmp/input.mp4 -map 0:v:0 -map 0:a:0? -vf scale=-2:1080,format=nv12,hwupload -c:v h264_vaapi -b:v 5000k -c:a copy -movflags +faststart /tmp/out/input_1080p.mp4"
    );
}

#[test]
fn snapshot_mpeg4_fallback_height() {
    assert_snapshot!(
        transcode_cmd(1001, VideoEncoder::Mpeg4),
        @"-hide_banner -nostdin -y -i /tmp/input.mp4 -map 0:v:0 -map 0:a:0? -vf scale=-2:1000 -c:v mpeg4 -b:v 1500k -c:a copy -movflags +faststart /tmp/out/input_1001p.mp4"
    );
}

#[test]
fn snapshot_extract_audio() {
    let args = build_extract_audio_args(
        Path::new("/tmp/input.mp4"),
        Path::new("/tmp/input.wav"),
        AudioFormat::Wav,
    );
    assert_snapshot!(
        args_to_string(&args),
        @"-hide_banner -nostdin -y -i /tmp/input.mp4 -vn -c:a pcm_s16le /tmp/input.wav"
    );
}

#[test]
fn snapshot_merge() {
    let args = build_merge_args(Path::new("/tmp/list.txt"), Path::new("/tmp/merged.mp4"));
    assert_snapshot!(
        args_to_string(&args),
        @"-hide_banner -nostdin -y -f concat -safe 0 -i /tmp/list.txt -c copy /tmp/merged.mp4"
    );
}

#[test]
fn snapshot_overlay() {
    let video = Path::new("/tmp/input.mp4");
    let mut options = OverlayOptions::new("/tmp/logo.png");
    options.opacity = 0.75;
    options.position = OverlayPosition::Center;
    options.start = Some(2.0);

    let args = build_overlay_args(video, &options, &overlay_output_path(video));
    assert_snapshot!(
        args_to_string(&args),
        @"-hide_banner -nostdin -y -i /tmp/input.mp4 -loop 1 -i /tmp/logo.png -filter_complex [1:v]format=rgba,colorchannelmixer=aa=0.75[img];[0:v][img]overlay=x=(main_w-overlay_w)/2:y=(main_h-overlay_h)/2:enable='gte(t,2)':eof_action=repeat:shortest=1[v] -map [v] -map 0:a? -c:v libopenh264 -pix_fmt yuv420p -c:a copy /tmp/input_overlay.mp4"
    );
}

#[test]
fn snapshot_thumbnail() {
    let args = build_thumbnail_args(
        Path::new("/tmp/input.mp4"),
        3.0,
        Path::new("/tmp/input_thumb.jpg"),
        None,
    );
    assert_snapshot!(
        args_to_string(&args),
        @"-hide_banner -nostdin -y -ss 3 -i /tmp/input.mp4 -frames:v 1 -q:v 2 /tmp/input_thumb.jpg"
    );
}

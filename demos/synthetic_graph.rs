//! Drive a capture session over a scripted in-memory graph.
//!
//! Usage:
//!   cargo run --example synthetic_graph

use std::error::Error;

use framegrab::{
    AudioFormat, CaptureSession, MediaType, MemoryGraph, PixelLayout, SampleLayout,
    ScriptedSample, VideoFormat,
};

fn main() -> Result<(), Box<dyn Error>> {
    let mut graph = MemoryGraph::new();

    // Two seconds of 4x4 video at 25 fps, each frame a flat grey level.
    let video = MediaType::Video(VideoFormat {
        width: 4,
        height: 4,
        layout: PixelLayout::Native("yuv420p".into()),
        frame_interval: 400_000,
    });
    let frames = (0..50)
        .map(|i| ScriptedSample::new(i as f64 / 25.0, vec![(i * 5) as u8; 4 * 4 * 3]))
        .collect();
    graph.add_rendered_stream(video, frames)?;

    // Two seconds of mono 16-bit audio in 100 ms buffers.
    let audio = MediaType::Audio(AudioFormat {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        layout: SampleLayout::Native("s16".into()),
    });
    let buffers = (0..20)
        .map(|i| ScriptedSample::new(i as f64 * 0.1, vec![0; 1_600 * 2]))
        .collect();
    graph.add_rendered_stream(audio, buffers)?;

    let mut session = CaptureSession::from_graph(graph)?;
    for splice in session.splices() {
        println!("Replaced '{}' ({})", splice.sink_name, splice.kind);
    }

    session.set_time_window(0.5, 1.25)?;
    session.run()?;

    let video = session.video_info(0)?;
    let audio = session.audio_info(0)?;
    println!("Captured {} of {} video frames", video.frames_captured, video.frames_total);
    println!(
        "Captured {} audio buffers, {} bytes",
        audio.frames_captured,
        session.audio_engines()[0].captured_bytes()
    );

    Ok(())
}

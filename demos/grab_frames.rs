//! Capture a few video frames from a media file and save them as PNG.
//!
//! Usage:
//!   cargo run --example grab_frames -- <input_file> [frame numbers...]

use std::error::Error;

use framegrab::{CaptureSession, FfmpegLogLevel, set_ffmpeg_log_level};

fn main() -> Result<(), Box<dyn Error>> {
    let mut arguments = std::env::args().skip(1);
    let input_path = arguments.next().unwrap_or_else(|| "input.mp4".to_string());
    let mut indices: Vec<u64> = arguments.map(|value| value.parse()).collect::<Result<_, _>>()?;
    if indices.is_empty() {
        indices = vec![1, 50, 100];
    }

    set_ffmpeg_log_level(FfmpegLogLevel::Error);

    println!("Opening {input_path}...");
    let mut session = CaptureSession::open(&input_path)?;
    let counts = session.capture_counts();
    println!(
        "Intercepted {} video and {} audio streams",
        counts.video_streams, counts.audio_streams
    );

    session.set_frame_indices(&indices)?;
    session.disable_audio();
    session.run()?;

    let info = session.video_info(0)?;
    println!(
        "Video: {}x{}, {} fps, {} frames{}",
        info.width,
        info.height,
        info.rate,
        info.frames_total,
        if info.total_is_estimate { " (estimated)" } else { "" },
    );
    if session.early_stop_occurred() {
        println!("Stopped early once frame {} was reached", indices.iter().max().unwrap_or(&0));
    }

    for index in 0..info.frames_captured {
        let filename = format!("frame_{index}.png");
        session.save_video_frame(0, index, &filename)?;
        println!("Saved {filename}");
    }

    Ok(())
}

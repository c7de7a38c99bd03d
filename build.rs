use std::{env, path::PathBuf};

const WATCHED_VARIABLES: [&str; 4] = ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"];

fn main() {
    for variable in WATCHED_VARIABLES {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    // ffmpeg-sys-next finds FFmpeg through pkg-config everywhere but Windows.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows")
        || env::var_os("FFMPEG_DIR").is_some()
    {
        return;
    }

    let Some(vcpkg_root) = env::var_os("VCPKG_ROOT") else {
        println!(
            "cargo:warning=framegrab needs FFmpeg. Set FFMPEG_DIR, or install FFmpeg with vcpkg and set VCPKG_ROOT."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let install = PathBuf::from(vcpkg_root).join("installed").join(triplet);
    if !install.is_dir() {
        println!(
            "cargo:warning=No vcpkg FFmpeg install under {}.",
            install.display()
        );
        return;
    }

    println!(
        "cargo:warning=Using vcpkg FFmpeg at {}; set FFMPEG_DIR to this path to silence this warning.",
        install.display()
    );
    if env::var_os("VCPKGRS_DYNAMIC").is_none() {
        println!("cargo:warning=Set VCPKGRS_DYNAMIC=1 if your vcpkg FFmpeg is a dynamic build.");
    }
}

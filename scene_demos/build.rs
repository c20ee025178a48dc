// build.rs
// Compiles resources/shaders/*.vert|frag to resources/shaders/spv/<file>.spv with glslc

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_DIR: &str = "resources/shaders";
const OUTPUT_DIR: &str = "resources/shaders/spv";

fn is_stage_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("vert" | "frag")
    )
}

fn needs_compile(source: &Path, output: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|meta| meta.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(src), Some(dst)) => src > dst,
        _ => true,
    }
}

fn compile_shaders(shader_dir: &Path, output_dir: &Path, glslc: &Path) -> Result<usize, String> {
    let entries = std::fs::read_dir(shader_dir).map_err(|e| format!("cannot read {}: {e}", shader_dir.display()))?;

    let mut compiled = 0;
    for entry in entries {
        let path = entry.map_err(|e| format!("bad entry in {}: {e}", shader_dir.display()))?.path();
        // Includes live in subdirectories and are never compiled on their own.
        if path.is_dir() || !is_stage_source(&path) {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let output = output_dir.join(format!("{file_name}.spv"));

        if !needs_compile(&path, &output) {
            eprintln!("info: Shader {file_name} is up to date");
            continue;
        }

        let status = Command::new(glslc)
            .arg("-I")
            .arg(shader_dir)
            .arg(&path)
            .arg("-o")
            .arg(&output)
            .status()
            .map_err(|e| format!("failed to run {}: {e}", glslc.display()))?;

        if !status.success() {
            return Err(format!("glslc failed for {file_name} with exit code {}", status.code().unwrap_or(-1)));
        }
        eprintln!("info: Compiled {file_name}");
        compiled += 1;
    }
    Ok(compiled)
}

fn main() {
    println!("cargo:rerun-if-changed={SHADER_DIR}");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        PathBuf::from(vulkan_sdk).join("Bin").join("glslc.exe")
    } else {
        PathBuf::from(vulkan_sdk).join("bin").join("glslc")
    };
    if !glslc.exists() {
        panic!("glslc not found at {}", glslc.display());
    }

    let output_dir = PathBuf::from(OUTPUT_DIR);
    if let Err(e) = std::fs::create_dir_all(&output_dir) {
        panic!("cannot create {}: {e}", output_dir.display());
    }

    match compile_shaders(Path::new(SHADER_DIR), &output_dir, &glslc) {
        Ok(0) => eprintln!("info: All shaders are up to date"),
        Ok(count) => eprintln!("info: Compiled {count} shader(s)"),
        Err(e) => panic!("Shader compilation failed: {e}"),
    }
}

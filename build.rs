// Build script to compile GLSL shaders to SPIR-V

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    // Compile shaders using glslc (part of Vulkan SDK)
    compile_shader("shaders/triangle.vert", &out_dir.join("triangle.vert.spv"));
    compile_shader("shaders/triangle.frag", &out_dir.join("triangle.frag.spv"));
}

fn compile_shader(input: &str, output: &Path) {
    let input_path = Path::new(input);

    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(output)
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            // Embed empty bytecode so the crate still builds; pipeline
            // creation rejects it at runtime.
            println!("cargo:warning=glslc not found ({}), {} not compiled", e, input);
            println!("cargo:warning=Install the Vulkan SDK or run: glslc {} -o {}", input, output.display());
            fs::write(output, []).expect("failed to write placeholder shader");
        }
    }
}
